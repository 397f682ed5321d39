// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Render worker: apply the replicated state, draw every surface, present in
//! lockstep.
//!
//! Per tick, in this order:
//! 1. receive the sync block and apply camera, transform and cross-fade;
//! 2. first barrier;
//! 3. replace the transfer function if a new one is pending;
//! 4. apply pending commands;
//! 5. draw each window (one pass, or two for interlaced stereo) and composite;
//! 6. second barrier;
//! 7. present.
//!
//! Commands land before drawing because they decide which layers are drawn.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use wall_app_core::prefs::WorkerPrefs;
use wall_geom::Node;
use wall_link::WorkerLink;
use wall_math::{Mat4, Vec3};
use wall_proto::{Command, SyncBlock, WireError, WorkerCommand};

use crate::camera::{Camera, CameraView};
use crate::context::ClusterContext;
use crate::transfer::TransferFunction;
use crate::WorkerError;

/// Largest frame buffer edge a worker will allocate.
pub const MAX_FRAME_BUFFER_EDGE: u32 = 16_384;

/// How a window turns passes into a presentable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StereoMode {
    /// One pass straight to the main buffer.
    #[default]
    Mono,
    /// Left and right passes into half-height buffers, interleaved on
    /// composite.
    Interlaced,
}

impl StereoMode {
    /// Eyes rendered per tick, in order.
    pub fn eyes(self) -> &'static [Eye] {
        match self {
            Self::Mono => &[Eye::Center],
            Self::Interlaced => &[Eye::Left, Eye::Right],
        }
    }
}

/// Which eye a pass renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    /// Mono pass.
    Center,
    /// Shifted by minus half the disparity along the surface's right vector.
    Left,
    /// Shifted by plus half the disparity.
    Right,
}

impl Eye {
    fn offset(self, right: Vec3, disparity: f32) -> Vec3 {
        match self {
            Self::Center => Vec3::ZERO,
            Self::Left => right.scale(-0.5 * disparity),
            Self::Right => right.scale(0.5 * disparity),
        }
    }
}

/// Scene layers the ray caster can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layers {
    /// Atom balls.
    pub balls: bool,
    /// Density volume.
    pub volume: bool,
}

impl Layers {
    /// Whether any layer is on.
    pub fn any(self) -> bool {
        self.balls || self.volume
    }
}

/// Worker-local render state. Commands overwrite it, never adjust it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Ray-march step size.
    pub delta_t: f32,
    /// Opacity scale.
    pub color_scale: f32,
    /// Layers drawn.
    pub layers: Layers,
    /// Clear colour.
    pub background: [f32; 3],
    /// Render-resolution scale per axis; `>= 10` means absolute pixels.
    pub res_scale: [f32; 2],
    /// Stereo compositing.
    pub stereo: StereoMode,
    /// Eye separation in world units.
    pub stereo_disparity: f32,
    /// Clip box enabled.
    pub clip_box: bool,
    /// Clip box minimum corner.
    pub clip_min: [f32; 3],
    /// Clip box maximum corner.
    pub clip_max: [f32; 3],
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_prefs(&WorkerPrefs::default())
    }
}

impl WorkerSettings {
    /// Initial settings for a worker.
    pub fn from_prefs(prefs: &WorkerPrefs) -> Self {
        Self {
            delta_t: 0.1,
            color_scale: 7.0,
            layers: Layers {
                balls: true,
                volume: true,
            },
            background: [0.4, 0.4, 0.4],
            res_scale: prefs.res_scale,
            stereo: if prefs.stereo {
                StereoMode::Interlaced
            } else {
                StereoMode::Mono
            },
            stereo_disparity: prefs.stereo_disparity,
            clip_box: false,
            clip_min: [0.0; 3],
            clip_max: [1.0; 3],
        }
    }

    /// Applies one command.
    pub fn apply(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::DeltaT(v) => self.delta_t = v,
            WorkerCommand::ColorScale(v) => self.color_scale = v,
            WorkerCommand::DrawBalls(on) => self.layers.balls = on,
            WorkerCommand::DrawVolume(on) => self.layers.volume = on,
            WorkerCommand::Background(rgb) => self.background = rgb,
            WorkerCommand::ResScale(xy) => self.res_scale = xy,
            WorkerCommand::Stereo(on) => {
                self.stereo = if on {
                    StereoMode::Interlaced
                } else {
                    StereoMode::Mono
                };
            }
            WorkerCommand::StereoDisparity(v) => self.stereo_disparity = v,
            WorkerCommand::ClipBox(on) => self.clip_box = on,
            WorkerCommand::ClipBoxExtents { min, max } => {
                self.clip_min = min;
                self.clip_max = max;
            }
        }
    }
}

/// Frame buffer sizes for one window, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBuffers {
    /// Mono buffer.
    pub main: [u32; 2],
    /// Each stereo eye buffer (half height).
    pub eye: [u32; 2],
}

impl FrameBuffers {
    /// Sizes for a `width` x `height` window at `res_scale`.
    ///
    /// A scale of 10 or more is taken as the absolute size for that axis.
    /// Returns `None` when any buffer would be empty, non-finite or larger
    /// than [`MAX_FRAME_BUFFER_EDGE`].
    pub fn for_window(width: u32, height: u32, res_scale: [f32; 2]) -> Option<Self> {
        let axis = |base: u32, scale: f32| -> f64 {
            let scale = f64::from(scale);
            if scale >= 10.0 {
                scale
            } else {
                f64::from(base) * scale
            }
        };
        let w = axis(width, res_scale[0]);
        let h = axis(height, res_scale[1]);
        Some(Self {
            main: [edge(w)?, edge(h)?],
            eye: [edge(w)?, edge(h / 2.0)?],
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn edge(value: f64) -> Option<u32> {
    let rounded = (value + 0.5).floor();
    if !rounded.is_finite() || rounded < 1.0 || rounded > f64::from(MAX_FRAME_BUFFER_EDGE) {
        return None;
    }
    Some(rounded as u32)
}

/// One ray-cast request: a surface seen by one eye.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    /// Frame number from the sync block.
    pub frame: u32,
    /// Window index within the node.
    pub window: usize,
    /// Surface index within the window.
    pub surface: usize,
    /// Eye this pass renders.
    pub eye: Eye,
    /// Off-axis view for this surface and eye.
    pub view: CameraView,
    /// Normalized window corners in the order bottom-left, top-left,
    /// top-right, bottom-right.
    pub window_mapping: [[f32; 2]; 4],
    /// Layers to draw.
    pub layers: Layers,
    /// Current worker settings.
    pub settings: &'a WorkerSettings,
    /// Transfer function, cross-fade included.
    pub transfer_function: &'a TransferFunction,
}

/// Drawing backend behind a worker. GPU code lives on the other side.
pub trait DrawPort: Send {
    /// Frame buffers for `window` were (re)sized.
    fn resize(&mut self, window: usize, buffers: FrameBuffers) -> Result<(), WorkerError>;

    /// Ray-casts one surface into the buffer for `call.eye`.
    fn ray_cast(&mut self, call: &DrawCall<'_>) -> Result<(), WorkerError>;

    /// Combines the passes of `window` into its presentable surface.
    fn composite(
        &mut self,
        window: usize,
        mode: StereoMode,
        settings: &WorkerSettings,
    ) -> Result<(), WorkerError>;

    /// Swaps every window's buffers.
    fn present(&mut self) -> Result<(), WorkerError>;
}

/// A render worker bound to one topology node.
pub struct Worker<W, D> {
    link: W,
    draw: D,
    node: Node,
    settings: WorkerSettings,
    camera: Camera,
    transform: Mat4,
    transfer_function: TransferFunction,
    alternates: Arc<[TransferFunction]>,
    buffers: Vec<FrameBuffers>,
    buffers_stale: bool,
    last_frame: Option<u32>,
}

impl<W: WorkerLink, D: DrawPort> Worker<W, D> {
    /// Builds a worker for the node `hostname` resolves to at this rank, and
    /// allocates its frame buffers.
    pub fn new(
        ctx: &ClusterContext,
        link: W,
        draw: D,
        hostname: &str,
    ) -> Result<Self, WorkerError> {
        let node = ctx.topology().node_for(hostname, link.rank())?.clone();
        info!(
            rank = link.rank(),
            %hostname,
            windows = node.windows.len(),
            surfaces = node.surface_count(),
            "worker bound to node"
        );
        let mut worker = Self {
            link,
            draw,
            node,
            settings: WorkerSettings::from_prefs(ctx.worker_prefs()),
            camera: Camera::default(),
            transform: Mat4::identity(),
            transfer_function: TransferFunction::default(),
            alternates: Arc::clone(ctx.alternates()),
            buffers: Vec::new(),
            buffers_stale: true,
            last_frame: None,
        };
        worker.allocate_buffers()?;
        Ok(worker)
    }

    /// Rank assigned by the master.
    pub fn rank(&self) -> usize {
        self.link.rank()
    }

    /// Node this worker draws.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Current settings.
    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Replicated camera.
    pub fn camera(&self) -> Camera {
        self.camera
    }

    /// Latest cave transform.
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Local transfer function.
    pub fn transfer_function(&self) -> &TransferFunction {
        &self.transfer_function
    }

    /// Frame buffer sizes per window.
    pub fn frame_buffers(&self) -> &[FrameBuffers] {
        &self.buffers
    }

    /// Frame number of the last block applied.
    pub fn last_frame(&self) -> Option<u32> {
        self.last_frame
    }

    /// Drawing backend.
    pub fn draw_port(&self) -> &D {
        &self.draw
    }

    /// Runs ticks until the master shuts down.
    #[instrument(skip(self), fields(rank = self.link.rank()))]
    pub async fn run(&mut self) -> Result<(), WorkerError> {
        info!("worker loop started");
        while self.tick().await? {}
        info!(last_frame = ?self.last_frame, "master shut down; worker exiting");
        Ok(())
    }

    /// One frame-locked tick. Returns `false` once the master has shut down.
    pub async fn tick(&mut self) -> Result<bool, WorkerError> {
        let Some(block) = self.link.recv_sync().await? else {
            return Ok(false);
        };
        self.apply_block(&block);
        self.link.barrier().await?;

        if let Some(points) = self.link.try_recv_transfer_function()? {
            debug!(points = points.len(), frame = block.frame, "transfer function replaced");
            self.transfer_function.set_points(points);
        }
        while let Some(cmd) = self.link.try_recv_command()? {
            self.apply_command(&cmd);
        }
        if self.buffers_stale {
            self.allocate_buffers()?;
        }
        self.draw_frame(block.frame)?;

        self.link.barrier().await?;
        self.draw.present()?;
        Ok(true)
    }

    fn apply_block(&mut self, block: &SyncBlock) {
        self.camera.unmarshal(&block.camera);
        self.transform = block.transform;
        if let Some(index) = block.cross_fade() {
            match self.alternates.get(index) {
                Some(target) => {
                    debug!(index, frame = block.frame, "cross-fade started");
                    self.transfer_function.begin_cross_fade(target.points());
                }
                None => warn!(
                    index,
                    available = self.alternates.len(),
                    "ignoring cross-fade to missing transfer function"
                ),
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        self.transfer_function.tick(block.dt as f32);
        self.last_frame = Some(block.frame);
    }

    /// Applies a command by name. Unknown or malformed commands are logged
    /// and skipped.
    pub fn apply_command(&mut self, cmd: &Command) {
        match WorkerCommand::try_from(cmd) {
            Ok(parsed) => {
                let before = (self.settings.res_scale, self.settings.stereo);
                self.settings.apply(parsed);
                if before != (self.settings.res_scale, self.settings.stereo) {
                    self.buffers_stale = true;
                }
                debug!(command = %cmd.name, "command applied");
            }
            Err(WireError::UnknownCommand(name)) => {
                warn!(command = %name, "ignoring unknown command");
            }
            Err(err) => warn!(command = %cmd.name, %err, "ignoring malformed command"),
        }
    }

    fn allocate_buffers(&mut self) -> Result<(), WorkerError> {
        let mut sizes = Vec::with_capacity(self.node.windows.len());
        for (index, window) in self.node.windows.iter().enumerate() {
            let buffers = FrameBuffers::for_window(window.width, window.height, self.settings.res_scale)
                .ok_or(WorkerError::FrameBuffer {
                    window: index,
                    width: window.width,
                    height: window.height,
                    scale: self.settings.res_scale,
                })?;
            self.draw.resize(index, buffers)?;
            sizes.push(buffers);
        }
        debug!(?sizes, "frame buffers allocated");
        self.buffers = sizes;
        self.buffers_stale = false;
        Ok(())
    }

    fn draw_frame(&mut self, frame: u32) -> Result<(), WorkerError> {
        let layers = self.settings.layers;
        let mode = self.settings.stereo;
        for (window_index, window) in self.node.windows.iter().enumerate() {
            if layers.any() {
                for &eye in mode.eyes() {
                    for (surface_index, surface) in window.surfaces.iter().enumerate() {
                        let placed = surface.transformed(&self.transform);
                        let offset = eye.offset(placed.u(), self.settings.stereo_disparity);
                        let call = DrawCall {
                            frame,
                            window: window_index,
                            surface: surface_index,
                            eye,
                            view: self.camera.view(&placed, offset),
                            window_mapping: placed.window_mapping(),
                            layers,
                            settings: &self.settings,
                            transfer_function: &self.transfer_function,
                        };
                        self.draw.ray_cast(&call)?;
                    }
                }
            }
            self.draw.composite(window_index, mode, &self.settings)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn buffers_scale_and_halve_for_stereo() {
        let b = FrameBuffers::for_window(1000, 801, [1.0, 1.0]).unwrap();
        assert_eq!(b.main, [1000, 801]);
        assert_eq!(b.eye, [1000, 401]);
        let b = FrameBuffers::for_window(1000, 800, [0.5, 0.25]).unwrap();
        assert_eq!(b.main, [500, 200]);
        assert_eq!(b.eye, [500, 100]);
    }

    #[test]
    fn large_scale_is_an_absolute_size() {
        let b = FrameBuffers::for_window(1000, 800, [1920.0, 0.5]).unwrap();
        assert_eq!(b.main, [1920, 400]);
    }

    #[test]
    fn empty_or_huge_buffers_are_refused() {
        assert!(FrameBuffers::for_window(1000, 800, [0.0, 1.0]).is_none());
        assert!(FrameBuffers::for_window(1000, 800, [1.0, f32::NAN]).is_none());
        assert!(FrameBuffers::for_window(1000, 800, [9.9, 9.9]).is_some());
        assert!(FrameBuffers::for_window(4000, 800, [9.0, 1.0]).is_none());
    }

    #[test]
    fn every_command_is_idempotent() {
        let commands = [
            WorkerCommand::DeltaT(0.05),
            WorkerCommand::ColorScale(9.1),
            WorkerCommand::DrawBalls(false),
            WorkerCommand::DrawVolume(false),
            WorkerCommand::Background([0.1, 0.2, 0.3]),
            WorkerCommand::ResScale([0.5, 0.5]),
            WorkerCommand::Stereo(true),
            WorkerCommand::StereoDisparity(0.2),
            WorkerCommand::ClipBox(true),
            WorkerCommand::ClipBoxExtents {
                min: [0.1, 0.1, 0.1],
                max: [0.9, 0.8, 0.7],
            },
        ];
        for cmd in commands {
            let mut once = WorkerSettings::default();
            once.apply(cmd);
            let mut twice = WorkerSettings::default();
            twice.apply(cmd);
            twice.apply(cmd);
            assert_eq!(once, twice, "{}", cmd.name());
            assert_ne!(once, WorkerSettings::default(), "{}", cmd.name());
        }
    }

    #[test]
    fn stereo_eyes_straddle_the_surface() {
        let right = Vec3::UNIT_X;
        assert_eq!(StereoMode::Mono.eyes(), &[Eye::Center]);
        assert_eq!(StereoMode::Interlaced.eyes(), &[Eye::Left, Eye::Right]);
        let l = Eye::Left.offset(right, 0.25);
        let r = Eye::Right.offset(right, 0.25);
        assert_eq!(l.x(), -0.125);
        assert_eq!(r.x(), 0.125);
    }
}
