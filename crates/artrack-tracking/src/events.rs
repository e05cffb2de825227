//! Frame event types and the synchronous dispatch bus.
//!
//! Listeners are registered per [`EventKind`] and invoked in registration
//! order. Payload matrices borrow the controller's reused buffers: copy them
//! if they are needed after the callback returns.
//!
//! The bus is single-threaded (`Rc` based). A listener may hold a clone of
//! the bus and register or remove listeners while an event is being
//! dispatched:
//! - a listener added during `emit` is first invoked on the next `emit`,
//! - a listener removed during `emit` is not invoked later in that `emit`,
//! - no other listener is skipped or invoked twice.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use artrack_core::{DetectionKind, GlMatrix, GroupSlot, RawDetection};
use log::debug;
use serde::{Deserialize, Serialize};

/// Tag of a [`FrameEvent`], used as the listener registration key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ControllerReady,
    MarkerCountReported,
    MarkerPoseReported,
    GroupPoseReported,
    GroupSubPoseReported,
    FrameProcessed,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::ControllerReady,
        EventKind::MarkerCountReported,
        EventKind::MarkerPoseReported,
        EventKind::GroupPoseReported,
        EventKind::GroupSubPoseReported,
        EventKind::FrameProcessed,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::ControllerReady => "controller_ready",
            EventKind::MarkerCountReported => "marker_count_reported",
            EventKind::MarkerPoseReported => "marker_pose_reported",
            EventKind::GroupPoseReported => "group_pose_reported",
            EventKind::GroupSubPoseReported => "group_sub_pose_reported",
            EventKind::FrameProcessed => "frame_processed",
        };
        f.write_str(name)
    }
}

/// A frame-scoped notification.
#[derive(Clone, Copy, Debug)]
pub enum FrameEvent<'a> {
    /// The controller is configured and about to process its first frame.
    ControllerReady,
    /// Number of raw squares found in the frame.
    MarkerCountReported { count: usize },
    /// Pose of one detection, in detection index order.
    MarkerPoseReported {
        index: usize,
        kind: DetectionKind,
        detection: &'a RawDetection,
        matrix: &'a GlMatrix,
    },
    /// Aggregate pose of a visible multi-marker group.
    GroupPoseReported { group_id: usize, matrix: &'a GlMatrix },
    /// One slot of a visible group, in slot order.
    GroupSubPoseReported {
        group_id: usize,
        sub_index: usize,
        slot: &'a GroupSlot,
        matrix: &'a GlMatrix,
    },
    /// Every other event of the frame has been dispatched.
    FrameProcessed { frame: u64, marker_count: usize },
}

impl FrameEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            FrameEvent::ControllerReady => EventKind::ControllerReady,
            FrameEvent::MarkerCountReported { .. } => EventKind::MarkerCountReported,
            FrameEvent::MarkerPoseReported { .. } => EventKind::MarkerPoseReported,
            FrameEvent::GroupPoseReported { .. } => EventKind::GroupPoseReported,
            FrameEvent::GroupSubPoseReported { .. } => EventKind::GroupSubPoseReported,
            FrameEvent::FrameProcessed { .. } => EventKind::FrameProcessed,
        }
    }
}

/// Error a listener may return.
pub type ListenerError = Box<dyn std::error::Error + 'static>;

pub type ListenerResult = Result<(), ListenerError>;

/// Handle identifying one registration, returned by [`EventBus::on`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One listener that returned an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListenerFailure {
    pub kind: EventKind,
    pub listener: ListenerId,
    pub message: String,
}

/// Listener errors collected over one or more `emit` calls.
#[derive(thiserror::Error, Clone, Debug, Default, PartialEq)]
#[error("{} listener(s) failed{}", .failures.len(), first_failure(.failures))]
pub struct DispatchFailures {
    pub failures: Vec<ListenerFailure>,
}

fn first_failure(failures: &[ListenerFailure]) -> String {
    failures
        .first()
        .map(|f| format!(" (first: {} listener {}: {})", f.kind, f.listener, f.message))
        .unwrap_or_default()
}

impl DispatchFailures {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn absorb(&mut self, other: DispatchFailures) {
        self.failures.extend(other.failures);
    }
}

type Callback = dyn FnMut(&FrameEvent<'_>) -> ListenerResult;

struct Entry {
    id: ListenerId,
    active: Cell<bool>,
    callback: RefCell<Box<Callback>>,
}

#[derive(Default)]
struct BusInner {
    next_id: Cell<u64>,
    listeners: RefCell<HashMap<EventKind, Vec<Rc<Entry>>>>,
}

/// Ordered, synchronous listener registry.
///
/// Cloning the bus yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.inner.listeners.borrow();
        let mut counts: Vec<(EventKind, usize)> =
            listeners.iter().map(|(k, v)| (*k, v.len())).collect();
        counts.sort();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`. The same closure logic may be
    /// registered several times; each registration gets its own id.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&FrameEvent<'_>) -> ListenerResult + 'static,
    {
        let id = ListenerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        let entry = Rc::new(Entry {
            id,
            active: Cell::new(true),
            callback: RefCell::new(Box::new(listener)),
        });
        self.inner
            .listeners
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(entry);
        id
    }

    /// Remove the registration `id` from `kind`. Returns `false` if it was
    /// not registered there.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = list.remove(pos);
        entry.active.set(false);
        true
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .borrow()
            .get(&kind)
            .map_or(0, |list| list.len())
    }

    /// Deliver `event` to every listener of its kind, in registration order.
    ///
    /// All listeners run even if some fail; the failures are returned
    /// together once the last listener has returned.
    pub fn emit(&self, event: &FrameEvent<'_>) -> Result<(), DispatchFailures> {
        let kind = event.kind();
        let snapshot: Vec<Rc<Entry>> = match self.inner.listeners.borrow().get(&kind) {
            Some(list) => list.clone(),
            None => return Ok(()),
        };

        let mut failures = DispatchFailures::default();
        for entry in snapshot {
            if !entry.active.get() {
                continue;
            }
            let Ok(mut callback) = entry.callback.try_borrow_mut() else {
                debug!("{kind}: listener {} re-entered, skipped", entry.id);
                continue;
            };
            if let Err(err) = callback(event) {
                failures.failures.push(ListenerFailure {
                    kind,
                    listener: entry.id,
                    message: err.to_string(),
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
