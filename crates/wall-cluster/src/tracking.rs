// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port to the motion-tracking feed (head, wand, controller buttons).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use wall_math::Vec3;

/// Samples older than this are ignored.
pub const SENSOR_EXPIRY: Duration = Duration::from_secs(4);

/// Buttons a controller can report.
pub const MAX_BUTTONS: usize = 32;

/// One tracked rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Position in feet, tracker space.
    pub position: Vec3,
    /// Euler angles in radians as (pitch, yaw, roll).
    pub orientation: Vec3,
    /// When the tracker produced the sample.
    pub timestamp: Instant,
}

impl SensorSample {
    /// Sample stamped now.
    pub fn now(position: Vec3, orientation: Vec3) -> Self {
        Self {
            position,
            orientation,
            timestamp: Instant::now(),
        }
    }

    /// Whether the sample is younger than [`SENSOR_EXPIRY`] at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) < SENSOR_EXPIRY
    }
}

/// Buttons currently held down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerState {
    held: u32,
}

impl ControllerState {
    /// State with the listed buttons held; out-of-range indices are ignored.
    pub fn with_held(buttons: &[usize]) -> Self {
        let mut state = Self::default();
        for &b in buttons {
            state.set(b, true);
        }
        state
    }

    /// Whether `button` is held.
    pub fn is_held(&self, button: usize) -> bool {
        button < MAX_BUTTONS && self.held & (1 << button) != 0
    }

    /// Marks `button` held or released.
    pub fn set(&mut self, button: usize, held: bool) {
        if button >= MAX_BUTTONS {
            return;
        }
        if held {
            self.held |= 1 << button;
        } else {
            self.held &= !(1 << button);
        }
    }
}

/// Discrete button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    /// Button index.
    pub button: usize,
    /// `true` on press, `false` on release.
    pub pressed: bool,
}

impl ButtonEvent {
    /// A release of `button`.
    pub const fn released(button: usize) -> Self {
        Self {
            button,
            pressed: false,
        }
    }
}

/// Source of tracker input, polled by the master's tracking loop.
///
/// An unreachable tracker simply reports no sensors; nothing here fails.
pub trait TrackingSource: Send {
    /// Pulls whatever the feed has delivered since the last poll.
    fn poll(&mut self);
    /// Latest head sample, if one was ever seen.
    fn head(&self) -> Option<SensorSample>;
    /// Latest wand sample, if one was ever seen.
    fn wand(&self) -> Option<SensorSample>;
    /// Buttons held as of the last poll.
    fn controller(&self) -> ControllerState;
    /// Next queued button transition.
    fn next_event(&mut self) -> Option<ButtonEvent>;
}

/// Tracker that never reports anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTracker;

impl TrackingSource for NullTracker {
    fn poll(&mut self) {}

    fn head(&self) -> Option<SensorSample> {
        None
    }

    fn wand(&self) -> Option<SensorSample> {
        None
    }

    fn controller(&self) -> ControllerState {
        ControllerState::default()
    }

    fn next_event(&mut self) -> Option<ButtonEvent> {
        None
    }
}

/// What a [`ScriptedTracker`] reports after one poll.
#[derive(Debug, Clone, Default)]
pub struct ScriptFrame {
    /// Head sample; `None` keeps the previous one.
    pub head: Option<SensorSample>,
    /// Wand sample; `None` keeps the previous one.
    pub wand: Option<SensorSample>,
    /// Buttons held during this frame.
    pub held: Vec<usize>,
    /// Transitions queued by this frame.
    pub events: Vec<ButtonEvent>,
}

/// Replays prepared frames, one per poll. Once the script runs out the last
/// state stays put.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTracker {
    frames: VecDeque<ScriptFrame>,
    head: Option<SensorSample>,
    wand: Option<SensorSample>,
    controller: ControllerState,
    events: VecDeque<ButtonEvent>,
}

impl ScriptedTracker {
    /// Tracker that will replay `frames` in order.
    pub fn new(frames: impl IntoIterator<Item = ScriptFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Appends a frame to the script.
    pub fn push(&mut self, frame: ScriptFrame) {
        self.frames.push_back(frame);
    }

    /// Frames not yet polled.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl TrackingSource for ScriptedTracker {
    fn poll(&mut self) {
        let Some(frame) = self.frames.pop_front() else {
            return;
        };
        if frame.head.is_some() {
            self.head = frame.head;
        }
        if frame.wand.is_some() {
            self.wand = frame.wand;
        }
        self.controller = ControllerState::with_held(&frame.held);
        self.events.extend(frame.events);
    }

    fn head(&self) -> Option<SensorSample> {
        self.head
    }

    fn wand(&self) -> Option<SensorSample> {
        self.wand
    }

    fn controller(&self) -> ControllerState {
        self.controller
    }

    fn next_event(&mut self) -> Option<ButtonEvent> {
        self.events.pop_front()
    }
}
