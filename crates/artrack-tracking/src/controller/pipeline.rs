use artrack_core::{
    compose_poses, to_homogeneous_into, AnalyzerError, AnalyzerSettings, DetectionKind,
    FrameView, GlMatrix, ImageAnalyzer, PoseMatrix, RawDetection,
};
use log::{debug, trace, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::{ControllerError, ControllerParams, FrameSummary, ParamsError};
use crate::classify::{classify, MarkerKey};
use crate::continuity::{MarkerTable, TrackedMarker};
use crate::events::{DispatchFailures, EventBus, FrameEvent};
use crate::multi::{GroupRegistry, GroupResult};

/// Where the controller is within a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameStage {
    #[default]
    Idle,
    DetectingMarkers,
    ClassifyingAndTracking,
    AggregatingMultiMarkers,
    Dispatched,
}

/// Per-frame marker tracking controller.
///
/// One [`process`](Self::process) call runs a frame to completion. Matrices
/// passed to listeners live in buffers owned by the controller and are
/// overwritten by the next event.
pub struct Controller<A: ImageAnalyzer> {
    analyzer: A,
    params: ControllerParams,
    settings: AnalyzerSettings,
    markers: MarkerTable,
    groups: GroupRegistry,
    bus: EventBus,
    stage: FrameStage,
    configured: bool,
    ready: bool,
    frames_processed: u64,
    scratch_pose: PoseMatrix,
    gl: GlMatrix,
    group_result: GroupResult,
}

impl<A: ImageAnalyzer> Controller<A> {
    /// Create a controller around `analyzer`, applying the configured marker
    /// widths.
    pub fn new(analyzer: A, params: ControllerParams) -> Result<Self, ParamsError> {
        params.validate()?;
        let mut markers = MarkerTable::new(params.default_marker_width);
        for w in &params.marker_widths {
            markers.track(w.key(), Some(w.width));
        }

        Ok(Self {
            analyzer,
            params,
            settings: AnalyzerSettings::default(),
            markers,
            groups: GroupRegistry::new(),
            bus: EventBus::new(),
            stage: FrameStage::Idle,
            configured: false,
            ready: false,
            frames_processed: 0,
            scratch_pose: PoseMatrix::zeros(),
            gl: GlMatrix::identity(),
            group_result: GroupResult::new(usize::MAX),
        })
    }

    /// Use `settings` when the analyzer is configured.
    pub fn with_settings(mut self, settings: AnalyzerSettings) -> Self {
        self.settings = settings;
        self.configured = false;
        self
    }

    /// Event bus of this controller. Clones share the same listeners.
    #[inline]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[inline]
    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    #[inline]
    pub fn analyzer_mut(&mut self) -> &mut A {
        &mut self.analyzer
    }

    pub fn into_analyzer(self) -> A {
        self.analyzer
    }

    #[inline]
    pub fn params(&self) -> &ControllerParams {
        &self.params
    }

    #[inline]
    pub fn markers(&self) -> &MarkerTable {
        &self.markers
    }

    #[inline]
    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    #[inline]
    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    /// Number of frames processed successfully so far.
    #[inline]
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Start tracking pattern `id` before it is first detected.
    pub fn track_pattern_marker(&mut self, id: u32, width: Option<f64>) -> &TrackedMarker {
        self.markers.track(MarkerKey::pattern(id), width)
    }

    /// Start tracking barcode `id` before it is first detected.
    pub fn track_barcode_marker(&mut self, id: u32, width: Option<f64>) -> &TrackedMarker {
        self.markers.track(MarkerKey::barcode(id), width)
    }

    /// Set the physical width of a marker. Takes effect at its next solve.
    pub fn set_marker_width(&mut self, key: MarkerKey, width: f64) -> Result<(), ParamsError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(ParamsError::InvalidMarkerWidth {
                kind: key.kind,
                id: key.id,
                width,
            });
        }
        self.markers.track(key, Some(width));
        Ok(())
    }

    /// Register a multi-marker group loaded in the analyzer. Returns its
    /// slot count.
    pub fn register_multi_marker(&mut self, group_id: usize) -> Result<usize, AnalyzerError> {
        self.groups
            .register(&self.analyzer, group_id)
            .map(|g| g.slot_count())
    }

    /// Configure the analyzer and announce readiness.
    ///
    /// `ControllerReady` is emitted once per controller; later calls do
    /// nothing.
    pub fn initialize(&mut self) -> Result<(), DispatchFailures> {
        self.ensure_configured();
        if self.ready {
            return Ok(());
        }
        self.ready = true;
        debug!("controller ready");
        self.bus.emit(&FrameEvent::ControllerReady)
    }

    fn ensure_configured(&mut self) {
        if !self.configured {
            self.analyzer.configure(&self.settings);
            self.configured = true;
        }
    }

    /// Process one frame: detect, classify and track every detection,
    /// aggregate multi-marker groups and dispatch the resulting events.
    ///
    /// If the analyzer cannot ingest the frame nothing is dispatched and the
    /// tracking state is left exactly as it was. Listener failures do not
    /// interrupt the frame; they are returned together once it completes.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn process(&mut self, frame: &FrameView<'_>) -> Result<FrameSummary, ControllerError> {
        self.ensure_configured();

        self.stage = FrameStage::DetectingMarkers;
        let count = match self.analyzer.detect(frame) {
            Ok(count) => count,
            Err(err) => {
                self.stage = FrameStage::Idle;
                if err.is_acquisition() {
                    debug!("frame skipped: {err}");
                } else {
                    warn!("analyzer rejected frame: {err}");
                }
                return Err(ControllerError::Acquisition(err));
            }
        };

        let mut failures = DispatchFailures::default();
        if !self.ready {
            self.ready = true;
            collect(self.bus.emit(&FrameEvent::ControllerReady), &mut failures);
        }

        let mut summary = FrameSummary {
            frame: self.frames_processed + 1,
            marker_count: count,
            ..FrameSummary::default()
        };
        collect(
            self.bus
                .emit(&FrameEvent::MarkerCountReported { count }),
            &mut failures,
        );

        self.stage = FrameStage::ClassifyingAndTracking;
        self.markers.roll_visibility();
        for index in 0..count {
            self.track_detection(index, &mut summary, &mut failures);
        }

        self.stage = FrameStage::AggregatingMultiMarkers;
        self.groups.sync(&self.analyzer);
        for position in 0..self.groups.len() {
            self.report_group(position, &mut summary, &mut failures);
        }

        self.stage = FrameStage::Dispatched;
        self.frames_processed += 1;
        collect(
            self.bus.emit(&FrameEvent::FrameProcessed {
                frame: summary.frame,
                marker_count: count,
            }),
            &mut failures,
        );
        self.stage = FrameStage::Idle;

        trace!("frame {} done: {summary:?}", summary.frame);
        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(ControllerError::Listener { summary, failures })
        }
    }

    fn track_detection(
        &mut self,
        index: usize,
        summary: &mut FrameSummary,
        failures: &mut DispatchFailures,
    ) {
        let mut det = match self.analyzer.detection(index) {
            Ok(det) => det,
            Err(err) => {
                warn!("skipping detection {index}: {err}");
                return;
            }
        };

        let Some(class) = classify(&det) else {
            summary.unclassified += 1;
            if self.params.report_unclassified {
                self.report_unclassified(index, &det, failures);
            }
            return;
        };

        if class.dir != det.dir {
            match self.analyzer.set_detection_dir(index, class.dir) {
                Ok(()) => det.dir = class.dir,
                Err(err) => warn!("{}: cannot correct direction: {err}", class.key),
            }
        }

        let update = match self
            .markers
            .update(&mut self.analyzer, index, class.key, None)
        {
            Ok(update) => update,
            Err(err) => {
                summary.pose_failures += 1;
                debug!("{}: {err}", class.key);
                return;
            }
        };

        summary.tracked += 1;
        if update.used_continuity() {
            summary.continuity_solves += 1;
        }
        to_homogeneous_into(&update.pose, self.params.transform_scale, &mut self.gl);
        collect(
            self.bus.emit(&FrameEvent::MarkerPoseReported {
                index,
                kind: class.key.kind.into(),
                detection: &det,
                matrix: &self.gl,
            }),
            failures,
        );
    }

    fn report_unclassified(
        &mut self,
        index: usize,
        det: &RawDetection,
        failures: &mut DispatchFailures,
    ) {
        let width = self.markers.default_width();
        if let Err(err) = self
            .analyzer
            .solve_pose(index, width, &mut self.scratch_pose)
        {
            debug!("unclassified square {index}: {err}");
            return;
        }
        to_homogeneous_into(&self.scratch_pose, self.params.transform_scale, &mut self.gl);
        collect(
            self.bus.emit(&FrameEvent::MarkerPoseReported {
                index,
                kind: DetectionKind::Unknown,
                detection: det,
                matrix: &self.gl,
            }),
            failures,
        );
    }

    fn report_group(
        &mut self,
        position: usize,
        summary: &mut FrameSummary,
        failures: &mut DispatchFailures,
    ) {
        self.groups
            .evaluate_into(&mut self.analyzer, position, &mut self.group_result);
        if !self.group_result.visible {
            return;
        }
        summary.groups_visible += 1;

        let group_id = self.group_result.group_id;
        let scale = self.params.transform_scale;
        to_homogeneous_into(&self.group_result.pose, scale, &mut self.gl);
        collect(
            self.bus.emit(&FrameEvent::GroupPoseReported {
                group_id,
                matrix: &self.gl,
            }),
            failures,
        );

        for sub in &self.group_result.sub_results {
            let pose = compose_poses(&self.group_result.pose, &sub.slot.local_pose);
            to_homogeneous_into(&pose, scale, &mut self.gl);
            collect(
                self.bus.emit(&FrameEvent::GroupSubPoseReported {
                    group_id,
                    sub_index: sub.slot_index,
                    slot: &sub.slot,
                    matrix: &self.gl,
                }),
                failures,
            );
        }
    }
}

fn collect(result: Result<(), DispatchFailures>, failures: &mut DispatchFailures) {
    if let Err(err) = result {
        warn!("{err}");
        failures.absorb(err);
    }
}
