// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Master orchestrator: the sync loop, the tracking loop, and the handle the
//! operator drives them through.
//!
//! Two tasks share one [`SharedState`] behind a mutex. The lock is held only to
//! copy state in or out, never across a network call. Commands travel through
//! the [`CommandQueue`], whose own lock is never taken while the state lock is
//! held.
//!
//! Sync tick, in order:
//! 1. snapshot the shared state into a [`SyncBlock`], consuming the one-shot
//!    cross-fade target;
//! 2. if a flush is due and the transfer function changed, push it;
//! 3. broadcast the block;
//! 4. two barriers (everyone has the block; everyone has drawn);
//! 5. if a flush is due, drain the coalesced commands to every worker;
//! 6. fold the whole tick, push and flush included, into the cluster FPS
//!    estimate.
//!
//! The first block carries `dt = 0`; later blocks carry the time since the
//! previous one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use wall_geom::FEET_TO_GRID;
use wall_link::MasterLink;
use wall_math::{Mat4, Vec3};
use wall_proto::{Command, SyncBlock, TfPoint, WorkerCommand};

use crate::camera::Camera;
use crate::command_queue::CommandQueue;
use crate::context::ClusterContext;
use crate::nav::NavigationFilter;
use crate::tracking::TrackingSource;
use crate::transfer::TransferFunction;
use crate::MasterError;

/// Samples averaged into one cluster FPS reading.
pub const FPS_WINDOW: usize = 30;

/// Held: navigate with the wand. Released: colour scale up.
pub const NAVIGATE_BUTTON: usize = 10;
/// Held: snap the cave back to the identity transform.
pub const RESET_BUTTON: usize = 0;
/// Released: colour scale down.
pub const COLOR_DOWN_BUTTON: usize = 11;
/// Released: finer ray-march step.
pub const STEP_DOWN_BUTTON: usize = 12;
/// Released: coarser ray-march step.
pub const STEP_UP_BUTTON: usize = 13;
/// Released: cross-fade to the next alternate transfer function.
pub const CROSS_FADE_BUTTON: usize = 8;

const DIAL_FACTOR: f32 = 1.3;

/// State written by the tracker and operator, read by the sync loop.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Authoritative camera.
    pub camera: Camera,
    /// Aggregate cave transform.
    pub transform: Mat4,
    /// One-shot cross-fade request, consumed by the next sync block.
    pub cross_fade_target: Option<usize>,
    /// Master copy of the transfer function.
    pub transfer_function: Vec<TfPoint>,
    /// Set when `transfer_function` changed since the last push.
    pub transfer_function_dirty: bool,
    /// Use the tracked head as the eye point.
    pub head_tracking: bool,
    /// Last colour scale sent to workers.
    pub color_scale: f32,
    /// Last ray-march step sent to workers.
    pub delta_t: f32,
    /// Alternate to cross-fade to on the next cycle.
    pub next_alternate: usize,
}

impl SharedState {
    fn new(ctx: &ClusterContext) -> Self {
        let eye_y = ctx.master_prefs().eye_height_ft * FEET_TO_GRID;
        Self {
            camera: Camera::new(Vec3::new(0.0, eye_y, 0.0)),
            transform: Mat4::identity(),
            cross_fade_target: None,
            transfer_function: TransferFunction::default().points().to_vec(),
            transfer_function_dirty: false,
            head_tracking: ctx.master_prefs().head_tracking,
            color_scale: 7.0,
            delta_t: 0.1,
            next_alternate: 0,
        }
    }
}

/// Rolling average of ticks per second, published every [`FPS_WINDOW`]
/// samples.
#[derive(Debug, Default)]
struct FpsMeter {
    samples: Vec<f64>,
}

impl FpsMeter {
    fn record(&mut self, elapsed: Duration) -> Option<f64> {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.samples.push(1.0 / secs);
        }
        if self.samples.len() < FPS_WINDOW {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        self.samples.clear();
        Some(average)
    }
}

fn duration_from_secs(secs: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(fallback)
}

/// Operator-facing handle. Cheap to clone; every clone drives the same master.
#[derive(Debug, Clone)]
pub struct MasterHandle {
    shared: Arc<Mutex<SharedState>>,
    queue: Arc<CommandQueue>,
    cluster_fps: Arc<AtomicU64>,
    stop: Arc<watch::Sender<bool>>,
    alternates: usize,
}

impl MasterHandle {
    fn state(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a raw command for the next flush.
    pub fn send_command(&self, command: Command) {
        debug!(command = %command.name, "command queued");
        self.queue.push(command);
    }

    /// Queues a typed worker command.
    pub fn send(&self, command: WorkerCommand) {
        self.send_command(command.to_command());
    }

    /// Sets the ray-march step on every worker.
    pub fn set_delta_t(&self, value: f32) {
        self.state().delta_t = value;
        self.send(WorkerCommand::DeltaT(value));
    }

    /// Sets the opacity scale on every worker.
    pub fn set_color_scale(&self, value: f32) {
        self.state().color_scale = value;
        self.send(WorkerCommand::ColorScale(value));
    }

    /// Turns the ball layer on or off.
    pub fn set_draw_balls(&self, on: bool) {
        self.send(WorkerCommand::DrawBalls(on));
    }

    /// Turns the volume layer on or off.
    pub fn set_draw_volume(&self, on: bool) {
        self.send(WorkerCommand::DrawVolume(on));
    }

    /// Sets the clear colour.
    pub fn set_background(&self, rgb: [f32; 3]) {
        self.send(WorkerCommand::Background(rgb));
    }

    /// Sets the render-resolution scale.
    pub fn set_res_scale(&self, x: f32, y: f32) {
        self.send(WorkerCommand::ResScale([x, y]));
    }

    /// Switches interlaced stereo on or off.
    pub fn set_stereo(&self, on: bool) {
        self.send(WorkerCommand::Stereo(on));
    }

    /// Sets the eye separation.
    pub fn set_stereo_disparity(&self, value: f32) {
        self.send(WorkerCommand::StereoDisparity(value));
    }

    /// Turns the clip box on or off.
    pub fn set_clip_box(&self, on: bool) {
        self.send(WorkerCommand::ClipBox(on));
    }

    /// Sets the clip box corners.
    pub fn set_clip_box_extents(&self, min: [f32; 3], max: [f32; 3]) {
        self.send(WorkerCommand::ClipBoxExtents { min, max });
    }

    /// Multiplies the colour scale by `factor`.
    pub fn scale_color(&self, factor: f32) {
        let value = {
            let mut state = self.state();
            state.color_scale *= factor;
            state.color_scale
        };
        self.send(WorkerCommand::ColorScale(value));
    }

    /// Multiplies the ray-march step by `factor`.
    pub fn scale_delta_t(&self, factor: f32) {
        let value = {
            let mut state = self.state();
            state.delta_t *= factor;
            state.delta_t
        };
        self.send(WorkerCommand::DeltaT(value));
    }

    /// Replaces the transfer function; every worker gets it at the next flush.
    pub fn update_transfer_function(&self, points: Vec<TfPoint>) {
        let mut state = self.state();
        state.transfer_function = points;
        state.transfer_function_dirty = true;
    }

    /// Master copy of the transfer function.
    pub fn transfer_function(&self) -> Vec<TfPoint> {
        self.state().transfer_function.clone()
    }

    /// Asks every worker to cross-fade to alternate `index` on the next tick.
    /// Returns `false` if no such alternate exists.
    pub fn set_cross_fade_target(&self, index: usize) -> bool {
        if index >= self.alternates {
            warn!(index, available = self.alternates, "no such alternate transfer function");
            return false;
        }
        self.state().cross_fade_target = Some(index);
        true
    }

    /// Cross-fades to the next alternate in turn. Returns the chosen index.
    pub fn cycle_cross_fade(&self) -> Option<usize> {
        if self.alternates == 0 {
            debug!("no alternate transfer functions to cycle through");
            return None;
        }
        let mut state = self.state();
        let target = state.next_alternate % self.alternates;
        state.next_alternate = (target + 1) % self.alternates;
        state.cross_fade_target = Some(target);
        Some(target)
    }

    /// Switches between head-tracked and fixed eye point.
    pub fn set_head_tracking(&self, on: bool) {
        self.state().head_tracking = on;
    }

    /// Whether head tracking is on.
    pub fn head_tracking(&self) -> bool {
        self.state().head_tracking
    }

    /// Latest averaged sync rate in ticks per second (0 until the first
    /// window fills).
    pub fn cluster_fps(&self) -> f64 {
        f64::from_bits(self.cluster_fps.load(Ordering::Relaxed))
    }

    /// Current authoritative camera.
    pub fn camera(&self) -> Camera {
        self.state().camera
    }

    /// Current aggregate transform.
    pub fn transform(&self) -> Mat4 {
        self.state().transform
    }

    /// Publishes a new camera and transform.
    pub fn publish_view(&self, camera: Camera, transform: Mat4) {
        let mut state = self.state();
        state.camera = camera;
        state.transform = transform;
    }

    /// Commands queued and not yet flushed.
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Stops the sync and tracking loops after their current tick.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Receiver that flips to `true` on [`MasterHandle::stop`].
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }
}

/// The sync loop, owning the link to every worker.
pub struct Master<L> {
    link: L,
    handle: MasterHandle,
    stop: watch::Receiver<bool>,
    fps: FpsMeter,
    flush_interval: Duration,
    last_flush: Option<Instant>,
    clock: Instant,
    last_time: Option<f64>,
    frame: u32,
}

impl<L: MasterLink> Master<L> {
    /// Builds the master and its operator handle.
    pub fn new(ctx: &ClusterContext, link: L) -> (Self, MasterHandle) {
        let (stop_tx, stop) = watch::channel(false);
        let handle = MasterHandle {
            shared: Arc::new(Mutex::new(SharedState::new(ctx))),
            queue: Arc::new(CommandQueue::new()),
            cluster_fps: Arc::new(AtomicU64::new(0f64.to_bits())),
            stop: Arc::new(stop_tx),
            alternates: ctx.alternates().len(),
        };
        let flush_interval = duration_from_secs(
            ctx.master_prefs().flush_interval_secs,
            Duration::from_secs_f64(1.0 / 15.0),
        );
        let master = Self {
            link,
            handle: handle.clone(),
            stop,
            fps: FpsMeter::default(),
            flush_interval,
            last_flush: None,
            clock: Instant::now(),
            last_time: None,
            frame: 0,
        };
        (master, handle)
    }

    /// Operator handle for this master.
    pub fn handle(&self) -> &MasterHandle {
        &self.handle
    }

    /// Number of workers in lockstep with this master.
    pub fn worker_count(&self) -> usize {
        self.link.worker_count()
    }

    /// Ticks until stopped, then releases the workers.
    #[instrument(skip(self), fields(workers = self.link.worker_count()))]
    pub async fn run(&mut self) -> Result<(), MasterError> {
        info!("sync loop started");
        while !*self.stop.borrow() {
            self.tick().await?;
            tokio::task::yield_now().await;
        }
        info!(frames = self.frame, "sync loop stopping");
        self.link.shutdown().await?;
        Ok(())
    }

    /// One frame-locked tick. Returns the block that was broadcast.
    pub async fn tick(&mut self) -> Result<SyncBlock, MasterError> {
        let started = Instant::now();
        let now = self.clock.elapsed().as_secs_f64();
        let flush_due = self
            .last_flush
            .is_none_or(|at| at.elapsed() >= self.flush_interval);

        let (block, transfer_function) = {
            let mut state = self.handle.state();
            let block = SyncBlock {
                frame: self.frame,
                dt: now - self.last_time.unwrap_or(now),
                time: now,
                cross_fade_target: state
                    .cross_fade_target
                    .take()
                    .and_then(|i| i32::try_from(i).ok())
                    .unwrap_or(-1),
                camera: state.camera.marshal(),
                transform: state.transform,
            };
            let transfer_function = if flush_due && state.transfer_function_dirty {
                state.transfer_function_dirty = false;
                Some(state.transfer_function.clone())
            } else {
                None
            };
            (block, transfer_function)
        };
        self.last_time = Some(now);

        if let Some(points) = transfer_function {
            debug!(frame = block.frame, points = points.len(), "pushing transfer function");
            self.link.push_transfer_function(&points).await?;
        }

        self.link.broadcast_sync(&block).await?;
        self.link.barrier().await?;
        self.link.barrier().await?;

        if flush_due {
            for command in self.handle.queue.drain_coalesced() {
                debug!(command = %command.name, frame = block.frame, "flushing command");
                self.link.send_command(&command).await?;
            }
            self.last_flush = Some(Instant::now());
        }

        if let Some(fps) = self.fps.record(started.elapsed()) {
            self.handle.cluster_fps.store(fps.to_bits(), Ordering::Relaxed);
            debug!(fps, frame = block.frame, "cluster rate");
        }

        self.frame = self.frame.wrapping_add(1);
        Ok(block)
    }
}

/// The tracking loop: polls the tracker, navigates, and publishes the camera.
pub struct Tracker<T> {
    source: T,
    handle: MasterHandle,
    nav: NavigationFilter,
    period: Duration,
    standing_eye: Vec3,
    wand_position: Vec3,
    wand_orientation: Vec3,
    wand_stale: bool,
    last_head: Option<Vec3>,
}

impl<T: TrackingSource> Tracker<T> {
    /// Tracker feeding the master behind `handle`.
    pub fn new(ctx: &ClusterContext, handle: MasterHandle, source: T) -> Self {
        let prefs = ctx.master_prefs();
        let period = if prefs.tracker_hz > 0.0 {
            duration_from_secs(1.0 / prefs.tracker_hz, Duration::from_secs_f64(1.0 / 80.0))
        } else {
            Duration::from_secs_f64(1.0 / 80.0)
        };
        Self {
            source,
            handle,
            nav: NavigationFilter::new(prefs.navigation),
            period,
            standing_eye: Vec3::new(0.0, prefs.eye_height_ft * FEET_TO_GRID, 0.0),
            wand_position: Vec3::ZERO,
            wand_orientation: Vec3::ZERO,
            wand_stale: true,
            last_head: None,
        }
    }

    /// Navigation state.
    pub fn navigation(&self) -> &NavigationFilter {
        &self.nav
    }

    /// Polls at the configured rate until the handle is stopped.
    #[instrument(skip(self), fields(period = ?self.period))]
    pub async fn run(&mut self) {
        let mut stop = self.handle.stop_signal();
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();
        info!("tracking loop started");
        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f32();
                    last = now;
                    self.step(dt);
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("tracking loop stopped");
    }

    /// One tracker update covering `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.source.poll();
        let now = Instant::now();
        let mut camera_updated = false;

        if let Some(head) = self.source.head().filter(|s| s.is_fresh(now)) {
            self.last_head = Some(head.position.scale(FEET_TO_GRID));
            camera_updated = true;
        }

        match self.source.wand().filter(|s| s.is_fresh(now)) {
            Some(wand) => {
                self.wand_position = wand.position.scale(FEET_TO_GRID);
                self.wand_orientation = wand.orientation;
                if self.wand_stale {
                    debug!("wand tracking live");
                    self.wand_stale = false;
                }
            }
            None => {
                if !self.wand_stale {
                    debug!("wand sample stale; holding last pose");
                    self.wand_stale = true;
                }
            }
        }

        // A stale wand holds the cave still; the filter only sees live poses.
        let controller = self.source.controller();
        if controller.is_held(NAVIGATE_BUTTON) {
            if !self.wand_stale {
                if !self.nav.is_active() {
                    self.nav.begin(self.wand_position, self.wand_orientation);
                }
                self.nav.update(self.wand_position, self.wand_orientation, dt);
                camera_updated = true;
            }
        } else if self.nav.is_active() {
            self.nav.release();
        }
        if controller.is_held(RESET_BUTTON) {
            self.nav.reset(self.wand_position, self.wand_orientation);
            if !self.wand_stale {
                self.nav.update(self.wand_position, self.wand_orientation, dt);
            }
            camera_updated = true;
        }

        if camera_updated {
            let eye = match self.last_head {
                Some(head) if self.handle.head_tracking() => head,
                _ => self.standing_eye,
            };
            let transform = self.nav.transform();
            let camera = Camera::new(transform.transform_point(&eye));
            self.handle.publish_view(camera, transform);
        }

        while let Some(event) = self.source.next_event() {
            if event.pressed {
                continue;
            }
            match event.button {
                NAVIGATE_BUTTON => self.handle.scale_color(DIAL_FACTOR),
                COLOR_DOWN_BUTTON => self.handle.scale_color(1.0 / DIAL_FACTOR),
                STEP_DOWN_BUTTON => self.handle.scale_delta_t(1.0 / DIAL_FACTOR),
                STEP_UP_BUTTON => self.handle.scale_delta_t(DIAL_FACTOR),
                CROSS_FADE_BUTTON => {
                    self.handle.cycle_cross_fade();
                }
                other => debug!(button = other, "unmapped button"),
            }
        }
    }
}
