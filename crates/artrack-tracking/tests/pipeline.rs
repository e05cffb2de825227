use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use approx::assert_relative_eq;
use artrack_core::{DetectionKind, FrameView, RawDetection, NO_ID};
use artrack_tracking::replay::{
    ReplayScript, ScriptedAnalyzer, ScriptedDetection, ScriptedFrame, ScriptedGroup,
    ScriptedGroupFrame, SolveRequest,
};
use artrack_tracking::{
    replay_script, Controller, ControllerError, ControllerParams, EventKind, EventRecord,
    FrameEvent, MarkerKey,
};

fn testdata_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../testdata")
        .join(name)
}

fn controller(script: ReplayScript) -> Controller<ScriptedAnalyzer> {
    let params = script.params.clone();
    Controller::new(ScriptedAnalyzer::new(script), params).expect("valid params")
}

fn frames(frames: Vec<ScriptedFrame>) -> ReplayScript {
    ReplayScript {
        frames,
        ..ReplayScript::default()
    }
}

/// Record the kind of every event dispatched on the controller's bus.
fn record_kinds(c: &Controller<ScriptedAnalyzer>) -> Rc<RefCell<Vec<EventKind>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for kind in EventKind::ALL {
        let log = log.clone();
        c.bus().on(kind, move |event| {
            log.borrow_mut().push(event.kind());
            Ok(())
        });
    }
    log
}

fn process(c: &mut Controller<ScriptedAnalyzer>) {
    c.process(&FrameView::empty()).expect("frame processed");
}

#[test]
fn missed_frame_clears_last_frame_visibility() {
    let key = MarkerKey::pattern(1);
    let mut c = controller(frames(vec![
        ScriptedFrame::with_detections(vec![ScriptedDetection::pattern(1)]),
        ScriptedFrame::default(),
        ScriptedFrame::default(),
    ]));

    process(&mut c);
    assert!(c.markers().get(&key).unwrap().visible_this_frame());
    process(&mut c);
    let marker = c.markers().get(&key).unwrap();
    assert!(marker.visible_last_frame());
    assert!(!marker.visible_this_frame());
    process(&mut c);
    assert!(!c.markers().get(&key).unwrap().visible_last_frame());
}

#[test]
fn continuity_solve_iff_visible_last_frame() {
    // Seen, seen, missed, seen, seen.
    let seen = || ScriptedFrame::with_detections(vec![ScriptedDetection::barcode(4)]);
    let mut c = controller(frames(vec![
        seen(),
        seen(),
        ScriptedFrame::default(),
        seen(),
        seen(),
    ]));
    for _ in 0..5 {
        process(&mut c);
    }

    let continuous: Vec<bool> = c
        .analyzer()
        .calls()
        .iter()
        .map(|call| matches!(call.request, SolveRequest::Continuous { .. }))
        .collect();
    assert_eq!(continuous, vec![false, true, false, true]);
}

#[test]
fn continuity_seed_is_previous_pose() {
    let mut c = controller(frames(vec![
        ScriptedFrame::with_detections(vec![
            ScriptedDetection::pattern(2).with_translation(3.0, 0.0, -9.0)
        ]),
        ScriptedFrame::with_detections(vec![ScriptedDetection::pattern(2)]),
    ]));
    process(&mut c);
    process(&mut c);

    match c.analyzer().calls()[1].request {
        SolveRequest::Continuous { seed } => {
            assert_eq!(seed[(0, 3)], 3.0);
            assert_eq!(seed[(2, 3)], -9.0);
        }
        other => panic!("expected continuous solve, got {other:?}"),
    }
}

#[test]
fn classification_drives_reported_kind() {
    let mut c = controller(frames(vec![ScriptedFrame::with_detections(vec![
        ScriptedDetection::pattern(5),
        ScriptedDetection::barcode(7),
        ScriptedDetection::unknown(),
    ])]));
    let kinds = Rc::new(RefCell::new(Vec::new()));
    let k = kinds.clone();
    c.bus().on(EventKind::MarkerPoseReported, move |event| {
        if let FrameEvent::MarkerPoseReported { index, kind, .. } = event {
            k.borrow_mut().push((*index, *kind));
        }
        Ok(())
    });

    let summary = c.process(&FrameView::empty()).unwrap();
    assert_eq!(
        *kinds.borrow(),
        vec![
            (0, DetectionKind::Pattern),
            (1, DetectionKind::Barcode),
            (2, DetectionKind::Unknown),
        ]
    );
    assert_eq!(summary.tracked, 2);
    assert_eq!(summary.unclassified, 1);
    assert!(c.markers().get(&MarkerKey::pattern(5)).is_some());
    assert!(c.markers().get(&MarkerKey::barcode(7)).is_some());
    assert_eq!(c.markers().len(), 2);
}

#[test]
fn unclassified_square_produces_no_tracking_events() {
    let script = ReplayScript {
        params: ControllerParams {
            report_unclassified: false,
            ..ControllerParams::default()
        },
        ..frames(vec![ScriptedFrame::with_detections(vec![
            ScriptedDetection::unknown().with_detection(RawDetection {
                id: NO_ID,
                id_patt: NO_ID,
                id_matrix: NO_ID,
                ..RawDetection::default()
            }),
        ])])
    };
    let mut c = controller(script);
    let log = record_kinds(&c);
    process(&mut c);

    assert!(!log.borrow().contains(&EventKind::MarkerPoseReported));
    assert!(c.markers().is_empty());
    assert!(c.analyzer().calls().is_empty());
}

#[test]
fn unclassified_square_uses_fresh_solve_at_default_width() {
    let script = ReplayScript {
        params: ControllerParams {
            default_marker_width: 25.0,
            ..ControllerParams::default()
        },
        ..frames(vec![
            ScriptedFrame::with_detections(vec![ScriptedDetection::unknown()]),
            ScriptedFrame::with_detections(vec![ScriptedDetection::unknown()]),
        ])
    };
    let mut c = controller(script);
    process(&mut c);
    process(&mut c);

    let calls = c.analyzer().calls();
    assert_eq!(calls.len(), 2);
    assert!(calls
        .iter()
        .all(|call| call.request == SolveRequest::Fresh && call.marker_width == 25.0));
    assert!(c.markers().is_empty());
}

#[test]
fn pose_failure_is_silent_and_not_visible() {
    let mut c = controller(frames(vec![ScriptedFrame::with_detections(vec![
        ScriptedDetection::pattern(3).failing(-1),
    ])]));
    let log = record_kinds(&c);
    let summary = c.process(&FrameView::empty()).unwrap();

    assert_eq!(summary.pose_failures, 1);
    assert_eq!(summary.tracked, 0);
    assert!(!log.borrow().contains(&EventKind::MarkerPoseReported));
    let marker = c.markers().get(&MarkerKey::pattern(3)).unwrap();
    assert!(!marker.visible_this_frame());
}

fn group_script(visible: Vec<i32>) -> ReplayScript {
    ReplayScript {
        groups: vec![ScriptedGroup::with_patterns(&[0, 1, 2])],
        frames: vec![ScriptedFrame {
            groups: vec![ScriptedGroupFrame {
                group_id: 0,
                visible,
                ..ScriptedGroupFrame::default()
            }],
            ..ScriptedFrame::default()
        }],
        ..ReplayScript::default()
    }
}

#[test]
fn visible_group_reports_every_slot_in_order() {
    let mut c = controller(group_script(vec![-1, 0, -1]));
    let subs = Rc::new(RefCell::new(Vec::new()));
    let s = subs.clone();
    c.bus().on(EventKind::GroupSubPoseReported, move |event| {
        if let FrameEvent::GroupSubPoseReported {
            sub_index, slot, ..
        } = event
        {
            s.borrow_mut().push((*sub_index, slot.is_visible()));
        }
        Ok(())
    });
    let log = record_kinds(&c);

    let summary = c.process(&FrameView::empty()).unwrap();
    assert_eq!(summary.groups_visible, 1);

    let log = log.borrow();
    let count = |kind: EventKind| log.iter().filter(|k| **k == kind).count();
    assert_eq!(count(EventKind::GroupPoseReported), 1);
    assert_eq!(count(EventKind::GroupSubPoseReported), 3);
    assert_eq!(*subs.borrow(), vec![(0, false), (1, true), (2, false)]);
}

#[test]
fn hidden_group_reports_nothing() {
    let mut c = controller(group_script(vec![-1, -1, -1]));
    let log = record_kinds(&c);
    let summary = c.process(&FrameView::empty()).unwrap();
    assert_eq!(summary.groups_visible, 0);

    let log = log.borrow();
    assert!(!log.contains(&EventKind::GroupPoseReported));
    assert!(!log.contains(&EventKind::GroupSubPoseReported));
}

#[test]
fn event_order_within_a_frame() {
    let mut script = group_script(vec![0, -1, -1]);
    script.frames[0].detections = vec![ScriptedDetection::pattern(9)];
    let mut c = controller(script);
    let log = record_kinds(&c);
    process(&mut c);

    assert_eq!(
        *log.borrow(),
        vec![
            EventKind::ControllerReady,
            EventKind::MarkerCountReported,
            EventKind::MarkerPoseReported,
            EventKind::GroupPoseReported,
            EventKind::GroupSubPoseReported,
            EventKind::GroupSubPoseReported,
            EventKind::GroupSubPoseReported,
            EventKind::FrameProcessed,
        ]
    );
}

#[test]
fn self_removing_listener_does_not_skip_sibling() {
    let mut c = controller(frames(vec![ScriptedFrame::default(), ScriptedFrame::default()]));
    let bus = c.bus().clone();
    let log = Rc::new(RefCell::new(Vec::new()));

    let own = Rc::new(RefCell::new(None));
    let (b, l, o) = (bus.clone(), log.clone(), own.clone());
    let first = bus.on(EventKind::MarkerCountReported, move |_| {
        l.borrow_mut().push("once");
        if let Some(id) = *o.borrow() {
            b.off(EventKind::MarkerCountReported, id);
        }
        Ok(())
    });
    *own.borrow_mut() = Some(first);
    let l = log.clone();
    bus.on(EventKind::MarkerCountReported, move |_| {
        l.borrow_mut().push("always");
        Ok(())
    });

    process(&mut c);
    process(&mut c);
    assert_eq!(*log.borrow(), vec!["once", "always", "always"]);
}

#[test]
fn failing_listener_is_reported_after_the_frame() {
    let mut c = controller(frames(vec![ScriptedFrame::with_detections(vec![
        ScriptedDetection::pattern(1),
    ])]));
    c.bus()
        .on(EventKind::MarkerPoseReported, |_| Err("renderer gone".into()));
    let log = record_kinds(&c);

    let err = c.process(&FrameView::empty()).unwrap_err();
    match &err {
        ControllerError::Listener { summary, failures } => {
            assert_eq!(summary.tracked, 1);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures.failures[0].kind, EventKind::MarkerPoseReported);
            assert_eq!(failures.failures[0].message, "renderer gone");
        }
        other => panic!("unexpected error {other:?}"),
    }
    // The sibling listener and later events still ran.
    assert!(log.borrow().contains(&EventKind::MarkerPoseReported));
    assert!(log.borrow().contains(&EventKind::FrameProcessed));
    assert_eq!(c.frames_processed(), 1);
    assert!(c
        .markers()
        .get(&MarkerKey::pattern(1))
        .unwrap()
        .visible_this_frame());
}

#[test]
fn acquisition_failure_leaves_state_untouched() {
    let mut c = controller(frames(vec![
        ScriptedFrame::with_detections(vec![
            ScriptedDetection::pattern(1),
            ScriptedDetection::barcode(2),
        ]),
        ScriptedFrame::with_detections(vec![ScriptedDetection::pattern(1)]),
        ScriptedFrame::acquisition_failure("no image"),
        ScriptedFrame::with_detections(vec![ScriptedDetection::pattern(1)]),
    ]));
    process(&mut c);
    process(&mut c);

    let flags = |c: &Controller<ScriptedAnalyzer>| {
        c.markers()
            .iter()
            .map(|m| (m.key(), m.visible_last_frame(), m.visible_this_frame(), *m.pose()))
            .collect::<Vec<_>>()
    };
    let before = flags(&c);
    let log = record_kinds(&c);

    let err = c.process(&FrameView::empty()).unwrap_err();
    assert!(matches!(err, ControllerError::Acquisition(_)));
    assert!(log.borrow().is_empty());
    assert_eq!(flags(&c), before);
    assert_eq!(c.frames_processed(), 2);

    // The marker seen before the failure is still refined from its last pose.
    c.analyzer_mut().take_calls();
    process(&mut c);
    assert!(matches!(
        c.analyzer().calls()[0].request,
        SolveRequest::Continuous { .. }
    ));
}

#[test]
fn transform_scale_applies_to_translation_only() {
    let script = ReplayScript {
        params: ControllerParams {
            transform_scale: Some(2.0),
            ..ControllerParams::default()
        },
        ..frames(vec![ScriptedFrame::with_detections(vec![
            ScriptedDetection::pattern(0).with_pose([
                0.0, -1.0, 0.0, 1.0, //
                1.0, 0.0, 0.0, 2.0, //
                0.0, 0.0, 1.0, 3.0,
            ]),
        ])])
    };
    let mut c = controller(script);
    let matrix = Rc::new(RefCell::new(None));
    let m = matrix.clone();
    c.bus().on(EventKind::MarkerPoseReported, move |event| {
        if let FrameEvent::MarkerPoseReported { matrix, .. } = event {
            *m.borrow_mut() = Some(**matrix);
        }
        Ok(())
    });
    process(&mut c);

    let gl = matrix.borrow().expect("pose reported");
    let flat = gl.as_slice();
    assert_relative_eq!(flat[12], 2.0);
    assert_relative_eq!(flat[13], 4.0);
    assert_relative_eq!(flat[14], 6.0);
    assert_relative_eq!(flat[15], 1.0);
    assert_relative_eq!(gl[(0, 1)], -1.0);
    assert_relative_eq!(gl[(1, 0)], 1.0);
}

#[test]
fn sub_pose_composes_group_and_slot() {
    let mut script = group_script(vec![0, 0, 0]);
    script.groups[0].slots[2].local_pose = [1.0, 0.0, 0.0, 5.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    script.frames[0].groups[0].pose = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, -10.0];
    let mut c = controller(script);
    let last = Rc::new(RefCell::new(None));
    let l = last.clone();
    c.bus().on(EventKind::GroupSubPoseReported, move |event| {
        if let FrameEvent::GroupSubPoseReported { matrix, .. } = event {
            *l.borrow_mut() = Some(**matrix);
        }
        Ok(())
    });
    process(&mut c);

    let gl = last.borrow().expect("sub pose reported");
    assert_relative_eq!(gl[(0, 3)], 5.0);
    assert_relative_eq!(gl[(2, 3)], -10.0);
}

#[test]
fn replay_fixture_matches_expectations() {
    let script = ReplayScript::load_json(testdata_path("replay_basic.json")).unwrap();
    let report = replay_script(script).unwrap();

    assert_eq!(report.frames.len(), 5);
    assert_eq!(report.frames_processed, 4);
    assert!(report.frames[2].error.is_some());
    assert!(report.frames[2].events.is_empty());

    let first = &report.frames[0];
    let summary = first.summary.unwrap();
    assert_eq!(summary.marker_count, 3);
    assert_eq!(summary.tracked, 2);
    assert_eq!(summary.unclassified, 1);
    assert_eq!(summary.groups_visible, 1);
    let subs = first
        .events
        .iter()
        .filter(|e| matches!(e, EventRecord::GroupSubPoseReported { .. }))
        .count();
    assert_eq!(subs, 3);

    // Frame 1 refines pattern 5 from frame 0.
    assert_eq!(report.frames[1].summary.unwrap().continuity_solves, 1);
    // Frame 4 follows an empty frame: fresh solve, and the barcode fails.
    let last = report.frames[4].summary.unwrap();
    assert_eq!(last.continuity_solves, 0);
    assert_eq!(last.pose_failures, 1);

    let barcode = report
        .markers
        .iter()
        .find(|m| m.key == MarkerKey::barcode(7))
        .unwrap();
    assert_eq!(barcode.marker_width, 20.0);
    assert!(!barcode.visible);
}
