//! Multi-marker group aggregation.
//!
//! A group is visible as long as any one of its slots is seen. When visible,
//! every slot is reported, in slot order, so observers can tell an occluded
//! slot from a missing one.

use artrack_core::{AnalyzerError, GroupSlot, ImageAnalyzer, PoseMatrix, SlotDescriptor};
use log::{debug, warn};

/// A registered rigid assembly of markers. Membership is fixed at registration.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiMarkerGroup {
    id: usize,
    slots: Vec<SlotDescriptor>,
    pose: PoseMatrix,
}

impl MultiMarkerGroup {
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Group pose from the most recent evaluation.
    #[inline]
    pub fn pose(&self) -> &PoseMatrix {
        &self.pose
    }
}

/// One slot reported for a visible group.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubResult {
    pub slot_index: usize,
    pub slot: GroupSlot,
}

/// Outcome of evaluating one group for the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupResult {
    pub group_id: usize,
    pub visible: bool,
    pub pose: PoseMatrix,
    /// Every slot in slot order when `visible`, empty otherwise.
    pub sub_results: Vec<SubResult>,
}

impl GroupResult {
    pub fn new(group_id: usize) -> Self {
        Self {
            group_id,
            visible: false,
            pose: PoseMatrix::zeros(),
            sub_results: Vec::new(),
        }
    }

    fn reset(&mut self, group_id: usize) {
        self.group_id = group_id;
        self.visible = false;
        self.sub_results.clear();
    }
}

/// Registered groups, kept in registration order.
#[derive(Clone, Debug, Default)]
pub struct GroupRegistry {
    groups: Vec<MultiMarkerGroup>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[MultiMarkerGroup] {
        &self.groups
    }

    pub fn get(&self, group_id: usize) -> Option<&MultiMarkerGroup> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    /// Register `group_id`, reading its slot layout from the analyzer.
    ///
    /// Registering an already known group is a no-op.
    pub fn register<A: ImageAnalyzer + ?Sized>(
        &mut self,
        analyzer: &A,
        group_id: usize,
    ) -> Result<&MultiMarkerGroup, AnalyzerError> {
        if let Some(pos) = self.groups.iter().position(|g| g.id == group_id) {
            return Ok(&self.groups[pos]);
        }

        let count = analyzer.group_slot_count(group_id)?;
        let slots = (0..count)
            .map(|slot| {
                analyzer
                    .group_slot(group_id, slot)
                    .map(|s| s.descriptor)
                    .unwrap_or_else(|err| {
                        warn!("group {group_id}: {err}; using default slot descriptor");
                        SlotDescriptor::default()
                    })
            })
            .collect();

        debug!("registered multi-marker group {group_id} with {count} slots");
        self.groups.push(MultiMarkerGroup {
            id: group_id,
            slots,
            pose: PoseMatrix::zeros(),
        });
        Ok(&self.groups[self.groups.len() - 1])
    }

    /// Adopt every analyzer group that is not registered yet, by increasing id.
    pub fn sync<A: ImageAnalyzer + ?Sized>(&mut self, analyzer: &A) {
        for group_id in 0..analyzer.group_count() {
            if self.get(group_id).is_some() {
                continue;
            }
            if let Err(err) = self.register(analyzer, group_id) {
                warn!("cannot register multi-marker group {group_id}: {err}");
            }
        }
    }

    /// Evaluate the group at registration position `position` into `out`.
    ///
    /// The slots are scanned twice: once to decide visibility (stopping at
    /// the first visible slot), then in full to report every slot.
    pub fn evaluate_into<A: ImageAnalyzer + ?Sized>(
        &mut self,
        analyzer: &mut A,
        position: usize,
        out: &mut GroupResult,
    ) {
        let Some(group) = self.groups.get_mut(position) else {
            out.reset(usize::MAX);
            return;
        };
        out.reset(group.id);

        if let Err(err) = analyzer.group_pose(group.id, &mut group.pose) {
            warn!("group {}: {err}", group.id);
            return;
        }
        out.pose = group.pose;

        let group_id = group.id;
        let visible = (0..group.slots.len()).any(|slot| {
            analyzer
                .group_slot(group_id, slot)
                .map(|s| s.is_visible())
                .unwrap_or(false)
        });
        if !visible {
            return;
        }

        out.visible = true;
        for (slot_index, descriptor) in group.slots.iter().enumerate() {
            let slot = analyzer
                .group_slot(group_id, slot_index)
                .unwrap_or_else(|err| {
                    debug!("group {group_id}: {err}; reporting slot as absent");
                    GroupSlot {
                        descriptor: *descriptor,
                        visible: -1,
                        local_pose: PoseMatrix::identity(),
                    }
                });
            out.sub_results.push(SubResult { slot_index, slot });
        }
    }

    /// Allocating convenience wrapper around [`evaluate_into`](Self::evaluate_into).
    pub fn evaluate<A: ImageAnalyzer + ?Sized>(
        &mut self,
        analyzer: &mut A,
        position: usize,
    ) -> GroupResult {
        let mut out = GroupResult::new(usize::MAX);
        self.evaluate_into(analyzer, position, &mut out);
        out
    }
}
