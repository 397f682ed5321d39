// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Draw backends that need no GPU.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};
use wall_math::Vec3;

use crate::worker::{DrawCall, DrawPort, Eye, FrameBuffers, Layers, StereoMode, WorkerSettings};
use crate::WorkerError;

/// Logs every call through `tracing` and draws nothing.
#[derive(Debug, Default)]
pub struct TraceDrawPort {
    presented: u64,
}

impl TraceDrawPort {
    /// New backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DrawPort for TraceDrawPort {
    fn resize(&mut self, window: usize, buffers: FrameBuffers) -> Result<(), WorkerError> {
        debug!(window, main = ?buffers.main, eye = ?buffers.eye, "resize");
        Ok(())
    }

    fn ray_cast(&mut self, call: &DrawCall<'_>) -> Result<(), WorkerError> {
        trace!(
            frame = call.frame,
            window = call.window,
            surface = call.surface,
            eye = ?call.eye,
            balls = call.layers.balls,
            volume = call.layers.volume,
            "ray cast"
        );
        Ok(())
    }

    fn composite(
        &mut self,
        window: usize,
        mode: StereoMode,
        _settings: &WorkerSettings,
    ) -> Result<(), WorkerError> {
        trace!(window, ?mode, "composite");
        Ok(())
    }

    fn present(&mut self) -> Result<(), WorkerError> {
        self.presented += 1;
        if self.presented % 600 == 0 {
            debug!(presented = self.presented, "frames presented");
        }
        Ok(())
    }
}

/// What one ray cast was asked to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    /// Frame number.
    pub frame: u32,
    /// Window index.
    pub window: usize,
    /// Surface index.
    pub surface: usize,
    /// Eye.
    pub eye: Eye,
    /// Layers requested.
    pub layers: Layers,
    /// Eye position used.
    pub position: Vec3,
    /// Image-plane bottom-left corner used.
    pub bottom_left: Vec3,
}

/// Everything a [`RecordingDrawPort`] saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawLog {
    /// Ray casts in call order.
    pub casts: Vec<DrawRecord>,
    /// Composites as `(window, mode)`.
    pub composites: Vec<(usize, StereoMode)>,
    /// Resizes as `(window, buffers)`.
    pub resizes: Vec<(usize, FrameBuffers)>,
    /// Present calls.
    pub presents: usize,
}

/// Records calls into a log that outlives the worker.
#[derive(Debug, Clone, Default)]
pub struct RecordingDrawPort {
    log: Arc<Mutex<DrawLog>>,
}

impl RecordingDrawPort {
    /// New recorder with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the log so far.
    pub fn snapshot(&self) -> DrawLog {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn with_log(&self, f: impl FnOnce(&mut DrawLog)) {
        f(&mut self.log.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl DrawPort for RecordingDrawPort {
    fn resize(&mut self, window: usize, buffers: FrameBuffers) -> Result<(), WorkerError> {
        self.with_log(|log| log.resizes.push((window, buffers)));
        Ok(())
    }

    fn ray_cast(&mut self, call: &DrawCall<'_>) -> Result<(), WorkerError> {
        let record = DrawRecord {
            frame: call.frame,
            window: call.window,
            surface: call.surface,
            eye: call.eye,
            layers: call.layers,
            position: call.view.position,
            bottom_left: call.view.bottom_left,
        };
        self.with_log(|log| log.casts.push(record));
        Ok(())
    }

    fn composite(
        &mut self,
        window: usize,
        mode: StereoMode,
        _settings: &WorkerSettings,
    ) -> Result<(), WorkerError> {
        self.with_log(|log| log.composites.push((window, mode)));
        Ok(())
    }

    fn present(&mut self) -> Result<(), WorkerError> {
        self.with_log(|log| log.presents += 1);
        Ok(())
    }
}
