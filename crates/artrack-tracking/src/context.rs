//! Frame-rate limited tracking session.

use std::time::Duration;

use artrack_core::{AnalyzerSettings, FrameView, ImageAnalyzer};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::controller::{Controller, ControllerError, ControllerParams, FrameSummary, ParamsError};
use crate::controls::{MarkerControls, MarkerControlsParams};

/// Source resolution and detection rate presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceProfile {
    DesktopFast,
    #[default]
    DesktopNormal,
    PhoneNormal,
    PhoneSlow,
}

impl PerformanceProfile {
    /// `(width, height, max_detection_rate)` of the preset.
    pub fn source(self) -> (u32, u32, f64) {
        match self {
            PerformanceProfile::DesktopFast => (1280, 960, 60.0),
            PerformanceProfile::DesktopNormal => (640, 480, 60.0),
            PerformanceProfile::PhoneNormal => (320, 240, 30.0),
            PerformanceProfile::PhoneSlow => (240, 180, 15.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextParams {
    /// Upper bound on processed frames per second.
    pub max_detection_rate: f64,
    pub source_width: u32,
    pub source_height: u32,
    pub analyzer: AnalyzerSettings,
    pub controller: ControllerParams,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self::for_profile(PerformanceProfile::default())
    }
}

impl ContextParams {
    pub fn for_profile(profile: PerformanceProfile) -> Self {
        let (source_width, source_height, max_detection_rate) = profile.source();
        Self {
            max_detection_rate,
            source_width,
            source_height,
            analyzer: AnalyzerSettings::default(),
            controller: ControllerParams::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.max_detection_rate.is_finite() && self.max_detection_rate > 0.0) {
            return Err(ParamsError::InvalidDetectionRate(self.max_detection_rate));
        }
        self.controller.validate()
    }

    /// Minimum time between two processed frames.
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_detection_rate)
    }
}

/// A controller plus the marker controls bound to it.
pub struct TrackingContext<A: ImageAnalyzer> {
    controller: Controller<A>,
    params: ContextParams,
    controls: Vec<MarkerControls>,
    last_update: Option<Duration>,
}

impl<A: ImageAnalyzer> TrackingContext<A> {
    pub fn new(analyzer: A, params: ContextParams) -> Result<Self, ParamsError> {
        params.validate()?;
        let controller =
            Controller::new(analyzer, params.controller.clone())?.with_settings(params.analyzer);
        Ok(Self {
            controller,
            params,
            controls: Vec::new(),
            last_update: None,
        })
    }

    #[inline]
    pub fn params(&self) -> &ContextParams {
        &self.params
    }

    #[inline]
    pub fn controller(&self) -> &Controller<A> {
        &self.controller
    }

    #[inline]
    pub fn controller_mut(&mut self) -> &mut Controller<A> {
        &mut self.controller
    }

    pub fn controls(&self) -> &[MarkerControls] {
        &self.controls
    }

    /// Bind a new target. Returns its position in [`controls`](Self::controls).
    pub fn add_marker(&mut self, params: MarkerControlsParams) -> Result<usize, ParamsError> {
        let controls = MarkerControls::attach(&mut self.controller, params)?;
        self.controls.push(controls);
        Ok(self.controls.len() - 1)
    }

    /// Detach and return the control at `position`.
    pub fn remove_marker(&mut self, position: usize) -> Option<MarkerControls> {
        (position < self.controls.len()).then(|| self.controls.remove(position))
    }

    /// Process `frame` captured at `now`, unless the previous processed frame
    /// is too recent.
    ///
    /// Returns `Ok(None)` for a skipped frame. Every control is marked
    /// invisible before a frame is processed, so targets not found in it stay
    /// hidden. A frame the analyzer cannot ingest leaves the controls and the
    /// rate limit as they were after the last processed frame.
    pub fn update(
        &mut self,
        frame: &FrameView<'_>,
        now: Duration,
    ) -> Result<Option<FrameSummary>, ControllerError> {
        if let Some(last) = self.last_update {
            if now.saturating_sub(last) < self.params.min_frame_interval() {
                trace!("frame at {now:?} throttled");
                return Ok(None);
            }
        }
        let previous = self.last_update.replace(now);

        let visible: Vec<bool> = self.controls.iter().map(|c| c.is_visible()).collect();
        for controls in &self.controls {
            controls.mark_invisible();
        }
        let summary = match self.controller.process(frame) {
            Ok(summary) => summary,
            Err(err @ ControllerError::Acquisition(_)) => {
                self.last_update = previous;
                for (controls, visible) in self.controls.iter().zip(visible) {
                    controls.restore_visible(visible);
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        debug!(
            "frame {}: {} markers, {} tracked",
            summary.frame, summary.marker_count, summary.tracked
        );
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlTarget;
    use crate::replay::{ReplayScript, ScriptedAnalyzer, ScriptedDetection, ScriptedFrame};

    fn context(frames: Vec<ScriptedFrame>) -> TrackingContext<ScriptedAnalyzer> {
        let script = ReplayScript {
            frames,
            ..ReplayScript::default()
        };
        TrackingContext::new(ScriptedAnalyzer::new(script), ContextParams::default()).unwrap()
    }

    #[test]
    fn profiles_fill_source_and_rate() {
        let params = ContextParams::for_profile(PerformanceProfile::PhoneSlow);
        assert_eq!((params.source_width, params.source_height), (240, 180));
        assert_eq!(params.max_detection_rate, 15.0);

        let parsed: PerformanceProfile = serde_json::from_str(r#""desktop-fast""#).unwrap();
        assert_eq!(parsed.source(), (1280, 960, 60.0));
    }

    #[test]
    fn rejects_non_positive_rate() {
        let params = ContextParams {
            max_detection_rate: 0.0,
            ..ContextParams::default()
        };
        assert_eq!(
            params.validate().unwrap_err(),
            ParamsError::InvalidDetectionRate(0.0)
        );
    }

    #[test]
    fn frames_inside_the_interval_are_skipped() {
        let mut ctx = context(vec![ScriptedFrame::default(), ScriptedFrame::default()]);
        let frame = FrameView::empty();
        assert!(ctx.update(&frame, Duration::from_millis(0)).unwrap().is_some());
        assert!(ctx.update(&frame, Duration::from_millis(5)).unwrap().is_none());
        let summary = ctx.update(&frame, Duration::from_millis(20)).unwrap();
        assert_eq!(summary.map(|s| s.frame), Some(2));
        assert_eq!(ctx.controller().analyzer().frames_remaining(), 0);
    }

    #[test]
    fn controls_hide_when_target_is_lost() {
        let mut ctx = context(vec![
            ScriptedFrame::with_detections(vec![ScriptedDetection::pattern(1)]),
            ScriptedFrame::default(),
        ]);
        let pos = ctx
            .add_marker(MarkerControlsParams::for_target(ControlTarget::Pattern(1)))
            .unwrap();
        let frame = FrameView::empty();

        ctx.update(&frame, Duration::from_secs(0)).unwrap();
        assert!(ctx.controls()[pos].is_visible());
        ctx.update(&frame, Duration::from_secs(1)).unwrap();
        assert!(!ctx.controls()[pos].is_visible());
        assert_eq!(ctx.controls()[pos].state().found_count, 1);

        assert!(ctx.remove_marker(pos).is_some());
        assert!(ctx.remove_marker(pos).is_none());
    }

    #[test]
    fn failed_frame_keeps_controls_and_rate_limit() {
        let mut ctx = context(vec![
            ScriptedFrame::with_detections(vec![ScriptedDetection::pattern(1)]),
            ScriptedFrame::acquisition_failure("camera stalled"),
            ScriptedFrame::with_detections(vec![ScriptedDetection::pattern(1)]),
        ]);
        let pos = ctx
            .add_marker(MarkerControlsParams::for_target(ControlTarget::Pattern(1)))
            .unwrap();
        let frame = FrameView::empty();

        ctx.update(&frame, Duration::from_millis(0)).unwrap();
        assert!(ctx.controls()[pos].is_visible());

        let err = ctx.update(&frame, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ControllerError::Acquisition(_)));
        assert!(ctx.controls()[pos].is_visible());
        assert_eq!(ctx.controls()[pos].state().found_count, 1);

        // The failed frame did not take the rate-limit slot.
        let summary = ctx.update(&frame, Duration::from_millis(25)).unwrap();
        assert_eq!(summary.map(|s| s.tracked), Some(1));
        assert_eq!(ctx.controls()[pos].state().found_count, 2);
    }

    #[test]
    fn analyzer_receives_context_settings() {
        let mut ctx = context(vec![ScriptedFrame::default()]);
        ctx.update(&FrameView::empty(), Duration::ZERO).unwrap();
        assert_eq!(
            ctx.controller().analyzer().configured_settings(),
            Some(&ctx.params().analyzer)
        );
    }
}
