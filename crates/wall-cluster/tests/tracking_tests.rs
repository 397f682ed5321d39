#![allow(missing_docs)]
use std::time::{Duration, Instant};

use wall_app_core::prefs::MasterPrefs;
use wall_cluster::master::{COLOR_DOWN_BUTTON, NAVIGATE_BUTTON, RESET_BUTTON, STEP_UP_BUTTON};
use wall_cluster::{
    ButtonEvent, ClusterContext, Master, MasterHandle, ScriptFrame, ScriptedTracker, SensorSample,
    Tracker,
};
use wall_geom::{Topology, TopologyDoc, FEET_TO_GRID};
use wall_link::local::in_process;
use wall_math::{Mat4, Vec3};

const DT: f32 = 1.0 / 80.0;

fn setup(frames: Vec<ScriptFrame>) -> (Tracker<ScriptedTracker>, MasterHandle) {
    let topology = Topology::from_doc(&TopologyDoc::single_wall("cave-1", 64, 48)).unwrap();
    let ctx = ClusterContext::new(topology).with_master_prefs(MasterPrefs::default());
    let (link, _workers) = in_process(0);
    let (_master, handle) = Master::new(&ctx, link);
    let tracker = Tracker::new(&ctx, handle.clone(), ScriptedTracker::new(frames));
    (tracker, handle)
}

fn wand_frame(position: Vec3, held: &[usize]) -> ScriptFrame {
    ScriptFrame {
        wand: Some(SensorSample::now(position, Vec3::ZERO)),
        held: held.to_vec(),
        ..ScriptFrame::default()
    }
}

fn stale_sample(position: Vec3) -> SensorSample {
    let old = Instant::now()
        .checked_sub(Duration::from_secs(10))
        .unwrap_or_else(Instant::now);
    SensorSample {
        position,
        orientation: Vec3::ZERO,
        timestamp: old,
    }
}

fn standing_eye() -> Vec3 {
    Vec3::new(0.0, MasterPrefs::default().eye_height_ft * FEET_TO_GRID, 0.0)
}

#[test]
fn idle_tracker_leaves_the_view_alone() {
    let (mut tracker, handle) = setup(vec![ScriptFrame::default(); 10]);
    let before = handle.camera();
    for _ in 0..10 {
        tracker.step(DT);
    }
    assert_eq!(handle.camera(), before);
    assert_eq!(handle.transform(), Mat4::identity());
    assert!(!tracker.navigation().is_active());
}

#[test]
fn holding_navigate_and_pushing_forward_moves_the_cave() {
    let mut frames = vec![wand_frame(Vec3::ZERO, &[NAVIGATE_BUTTON])];
    frames.extend((0..80).map(|_| wand_frame(Vec3::new(0.0, 0.0, -1.0), &[NAVIGATE_BUTTON])));
    let (mut tracker, handle) = setup(frames);
    for _ in 0..81 {
        tracker.step(DT);
    }
    assert!(tracker.navigation().is_active());
    let t = handle.transform().translation_part();
    assert!(t.z() < -0.5, "translation {t:?}");
    assert!(t.x().abs() < 1e-4);
    let camera = handle.camera().position;
    assert!(camera.approx_eq(&handle.transform().transform_point(&standing_eye()), 1e-5));
}

#[test]
fn releasing_navigate_stops_motion_and_turns_the_dial() {
    let mut frames = vec![wand_frame(Vec3::ZERO, &[NAVIGATE_BUTTON])];
    frames.extend((0..20).map(|_| wand_frame(Vec3::new(1.0, 0.0, 0.0), &[NAVIGATE_BUTTON])));
    frames.push(ScriptFrame {
        events: vec![ButtonEvent::released(NAVIGATE_BUTTON)],
        ..ScriptFrame::default()
    });
    frames.extend((0..20).map(|_| wand_frame(Vec3::new(3.0, 0.0, 0.0), &[])));
    let (mut tracker, handle) = setup(frames);
    for _ in 0..21 {
        tracker.step(DT);
    }
    tracker.step(DT);
    assert!(!tracker.navigation().is_active());
    assert_eq!(tracker.navigation().smoothed_move(), Vec3::ZERO);
    let parked = handle.transform();
    for _ in 0..20 {
        tracker.step(DT);
    }
    assert_eq!(handle.transform(), parked);
    assert_eq!(handle.pending_commands(), 1);
}

#[test]
fn reset_returns_to_the_origin() {
    let mut frames = vec![wand_frame(Vec3::ZERO, &[NAVIGATE_BUTTON])];
    frames.extend((0..40).map(|_| wand_frame(Vec3::new(0.0, 0.0, -1.0), &[NAVIGATE_BUTTON])));
    frames.push(wand_frame(Vec3::new(0.0, 0.0, -1.0), &[RESET_BUTTON]));
    let (mut tracker, handle) = setup(frames);
    for _ in 0..41 {
        tracker.step(DT);
    }
    assert!(!handle.transform().approx_eq(&Mat4::identity(), 1e-3));
    tracker.step(DT);
    assert!(handle.transform().approx_eq(&Mat4::identity(), 1e-6));
    assert!(handle.camera().position.approx_eq(&standing_eye(), 1e-6));
}

#[test]
fn stale_wand_samples_are_ignored() {
    let stale = SensorSample {
        orientation: Vec3::new(0.0, 1.0, 0.0),
        ..stale_sample(Vec3::new(0.0, 0.0, -3.0))
    };
    let frames = (0..40)
        .map(|_| ScriptFrame {
            wand: Some(stale),
            held: vec![NAVIGATE_BUTTON],
            ..ScriptFrame::default()
        })
        .collect();
    let (mut tracker, handle) = setup(frames);
    for _ in 0..40 {
        tracker.step(DT);
    }
    assert!(handle.transform().approx_eq(&Mat4::identity(), 1e-6));
}

#[test]
fn wand_going_stale_mid_gesture_holds_the_cave_still() {
    let mut frames = vec![wand_frame(Vec3::ZERO, &[NAVIGATE_BUTTON])];
    frames.extend((0..40).map(|_| wand_frame(Vec3::new(0.0, 0.0, -1.0), &[NAVIGATE_BUTTON])));
    frames.extend((0..80).map(|_| ScriptFrame {
        wand: Some(stale_sample(Vec3::new(0.0, 0.0, -1.0))),
        held: vec![NAVIGATE_BUTTON],
        ..ScriptFrame::default()
    }));
    let (mut tracker, handle) = setup(frames);
    for _ in 0..41 {
        tracker.step(DT);
    }
    let transform = handle.transform();
    let camera = handle.camera();
    assert!(!transform.approx_eq(&Mat4::identity(), 1e-3));
    for _ in 0..80 {
        tracker.step(DT);
    }
    assert_eq!(handle.transform(), transform);
    assert_eq!(handle.camera(), camera);
}

#[test]
fn stale_head_keeps_the_last_tracked_eye() {
    let head = Vec3::new(1.0, 6.0, 0.5);
    let frames = vec![
        ScriptFrame {
            head: Some(SensorSample::now(head, Vec3::ZERO)),
            wand: Some(SensorSample::now(Vec3::ZERO, Vec3::ZERO)),
            ..ScriptFrame::default()
        },
        ScriptFrame {
            head: Some(stale_sample(head)),
            held: vec![RESET_BUTTON],
            ..ScriptFrame::default()
        },
    ];
    let (mut tracker, handle) = setup(frames);
    handle.set_head_tracking(true);
    tracker.step(DT);
    let tracked = head.scale(FEET_TO_GRID);
    assert!(handle.camera().position.approx_eq(&tracked, 1e-6));

    tracker.step(DT);
    assert!(handle.transform().approx_eq(&Mat4::identity(), 1e-6));
    assert!(handle.camera().position.approx_eq(&tracked, 1e-6));
}

#[tokio::test]
async fn tracking_loop_exits_when_stopped_before_it_starts() {
    let (mut tracker, handle) = setup(Vec::new());
    handle.stop();
    let finished = tokio::time::timeout(Duration::from_secs(2), tracker.run()).await;
    assert!(finished.is_ok());
}

#[test]
fn head_tracking_moves_the_eye_to_the_head() {
    let head = Vec3::new(1.0, 6.0, 0.5);
    let frames = vec![
        ScriptFrame {
            head: Some(SensorSample::now(head, Vec3::ZERO)),
            ..ScriptFrame::default()
        };
        2
    ];
    let (mut tracker, handle) = setup(frames);
    tracker.step(DT);
    assert!(handle.camera().position.approx_eq(&standing_eye(), 1e-6));

    handle.set_head_tracking(true);
    tracker.step(DT);
    assert!(handle
        .camera()
        .position
        .approx_eq(&head.scale(FEET_TO_GRID), 1e-6));
}

#[test]
fn dial_buttons_queue_commands() {
    let frames = vec![ScriptFrame {
        events: vec![
            ButtonEvent::released(COLOR_DOWN_BUTTON),
            ButtonEvent::released(STEP_UP_BUTTON),
            ButtonEvent {
                button: STEP_UP_BUTTON,
                pressed: true,
            },
            ButtonEvent::released(31),
        ],
        ..ScriptFrame::default()
    }];
    let (mut tracker, handle) = setup(frames);
    tracker.step(DT);
    assert_eq!(handle.pending_commands(), 2);
}
