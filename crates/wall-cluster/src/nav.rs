// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wand-driven navigation: smoothed offsets integrated into the cave
//! transform.
//!
//! While the navigate gesture is held, the wand's displacement from where the
//! gesture began acts like a joystick: the further it is pushed, the faster the
//! cave moves and turns. Offsets are exponentially smoothed with a weight of
//! `smoothing_rate * dt` so the response does not depend on the tick rate.

use wall_app_core::prefs::NavigationPrefs;
use wall_math::{Mat4, Vec3};

/// Navigation state owned by the tracking task.
#[derive(Debug, Clone)]
pub struct NavigationFilter {
    prefs: NavigationPrefs,
    active: bool,
    lock_position: Vec3,
    lock_orientation: Vec3,
    smoothed_move: Vec3,
    smoothed_rotate: Vec3,
    translation: Vec3,
    rotation: Vec3,
}

impl NavigationFilter {
    /// Idle filter at the identity transform.
    pub fn new(prefs: NavigationPrefs) -> Self {
        Self {
            prefs,
            active: false,
            lock_position: Vec3::ZERO,
            lock_orientation: Vec3::ZERO,
            smoothed_move: Vec3::ZERO,
            smoothed_rotate: Vec3::ZERO,
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
        }
    }

    /// Starts a gesture: the current wand pose becomes the zero reference.
    pub fn begin(&mut self, position: Vec3, orientation: Vec3) {
        self.active = true;
        self.lock(position, orientation);
    }

    /// Advances one tick of `dt` seconds with the current wand pose.
    ///
    /// Does nothing unless a gesture is active.
    pub fn update(&mut self, position: Vec3, orientation: Vec3, dt: f32) {
        if !self.active {
            return;
        }
        let alpha = (self.prefs.smoothing_rate * dt).clamp(0.0, 1.0);
        let raw_move = position
            .sub(&self.lock_position)
            .clamp_components(self.prefs.max_rotation);
        let raw_rotate = orientation
            .sub(&self.lock_orientation)
            .clamp_components(self.prefs.max_rotation);
        self.smoothed_move = self.smoothed_move.blend_toward(&raw_move, alpha);
        self.smoothed_rotate = self.smoothed_rotate.blend_toward(&raw_rotate, alpha);

        self.rotation = self
            .rotation
            .add(&self.smoothed_rotate.scale(self.prefs.rotate_speed * dt));
        let step = Mat4::cave_rotation(self.rotation).transform_direction(&self.smoothed_move);
        self.translation = self
            .translation
            .add(&step.scale(self.prefs.move_speed * dt));
    }

    /// Ends the gesture. Accumulated motion is kept.
    pub fn release(&mut self) {
        self.active = false;
        self.smoothed_move = Vec3::ZERO;
        self.smoothed_rotate = Vec3::ZERO;
    }

    /// Snaps the cave back to the identity transform and re-locks the
    /// reference pose.
    pub fn reset(&mut self, position: Vec3, orientation: Vec3) {
        self.translation = Vec3::ZERO;
        self.rotation = Vec3::ZERO;
        self.lock(position, orientation);
    }

    fn lock(&mut self, position: Vec3, orientation: Vec3) {
        self.lock_position = position;
        self.lock_orientation = orientation;
        self.smoothed_move = Vec3::ZERO;
        self.smoothed_rotate = Vec3::ZERO;
    }

    /// Whether a gesture is in progress.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Smoothed translation input.
    pub fn smoothed_move(&self) -> Vec3 {
        self.smoothed_move
    }

    /// Smoothed rotation input.
    pub fn smoothed_rotate(&self) -> Vec3 {
        self.smoothed_rotate
    }

    /// Accumulated cave offset.
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// Accumulated cave rotation as (pitch, yaw, roll).
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// Aggregate cave transform, rebuilt from the accumulators.
    pub fn transform(&self) -> Mat4 {
        Mat4::cave_rotation(self.rotation).with_translation(self.translation)
    }
}
