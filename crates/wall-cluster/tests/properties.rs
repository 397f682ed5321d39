#![allow(missing_docs)]
use std::collections::HashMap;

use proptest::prelude::*;
use wall_app_core::prefs::NavigationPrefs;
use wall_cluster::{CommandQueue, NavigationFilter, TransferFunction};
use wall_math::Vec3;
use wall_proto::{Command, TfPoint};

fn any_vec3(limit: f32) -> impl Strategy<Value = Vec3> {
    (-limit..limit, -limit..limit, -limit..limit).prop_map(|(x, y, z)| Vec3::new(x, y, z))
}

fn within(v: Vec3, limit: f32) -> bool {
    v.to_array().iter().all(|c| c.abs() <= limit + 1e-5)
}

proptest! {
    #[test]
    fn smoothed_offsets_never_exceed_their_clamps(
        poses in prop::collection::vec((any_vec3(50.0), any_vec3(10.0), 0.0f32..2.0), 1..60),
    ) {
        let prefs = NavigationPrefs::default();
        let mut nav = NavigationFilter::new(prefs);
        nav.begin(Vec3::ZERO, Vec3::ZERO);
        for (position, orientation, dt) in poses {
            nav.update(position, orientation, dt);
            prop_assert!(within(nav.smoothed_move(), prefs.max_rotation));
            prop_assert!(within(nav.smoothed_rotate(), prefs.max_rotation));
        }
    }

    #[test]
    fn drained_batch_keeps_the_last_value_per_name(
        pushes in prop::collection::vec((0usize..5, any::<i32>()), 0..64),
    ) {
        let queue = CommandQueue::new();
        let mut last = HashMap::new();
        for &(name, value) in &pushes {
            queue.push(Command::new(format!("cmd{name}"), vec![value], vec![]));
            last.insert(format!("cmd{name}"), value);
        }
        let batch = queue.drain_coalesced();
        prop_assert_eq!(batch.len(), last.len());
        for cmd in &batch {
            prop_assert_eq!(Some(&cmd.ints[0]), last.get(&cmd.name));
        }
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn cross_fade_always_lands_on_the_target(steps in prop::collection::vec(0.0f32..1.0, 1..40)) {
        let target = vec![
            TfPoint::new(0.0, 1.0, 0.0, 0.5, 0.0),
            TfPoint::new(0.0, 1.0, 0.0, 0.5, 1.0),
        ];
        let mut tf = TransferFunction::default();
        tf.begin_cross_fade(&target);
        for dt in steps {
            tf.tick(dt);
            prop_assert!((0.0..1.0).contains(&tf.cross_fade_alpha()));
        }
        tf.tick(3.0);
        prop_assert!(!tf.is_cross_fading());
        prop_assert_eq!(tf.points(), target.as_slice());
    }
}
