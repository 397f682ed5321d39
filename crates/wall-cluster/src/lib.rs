// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frame-locked cluster rendering for a CAVE / tiled display wall.
//!
//! A single [`master::Master`] owns the authoritative camera, cave transform
//! and transfer function. Every tick it broadcasts a
//! [`SyncBlock`](wall_proto::SyncBlock), rendezvouses with all workers twice,
//! and flushes the coalesced [`command_queue::CommandQueue`]. A separate
//! [`master::Tracker`] task turns tracker input into navigation through the
//! [`nav::NavigationFilter`]. Each [`worker::Worker`] applies the block, drains
//! pending updates, draws every surface of its node through a
//! [`worker::DrawPort`], and presents after the closing barrier.
//!
//! Nothing here owns a global: a [`context::ClusterContext`] is built once and
//! handed to whichever side the process runs.

use wall_geom::TopologyError;
use wall_link::LinkError;

pub mod camera;
pub mod command_queue;
pub mod context;
pub mod draw;
pub mod master;
pub mod nav;
pub mod tracking;
pub mod transfer;
pub mod worker;

pub use camera::{Camera, CameraError, CameraView};
pub use command_queue::CommandQueue;
pub use context::ClusterContext;
pub use draw::{DrawLog, DrawRecord, RecordingDrawPort, TraceDrawPort};
pub use master::{Master, MasterHandle, SharedState, Tracker};
pub use nav::NavigationFilter;
pub use tracking::{
    ButtonEvent, ControllerState, NullTracker, ScriptFrame, ScriptedTracker, SensorSample,
    TrackingSource,
};
pub use transfer::{TransferFunction, TransferFunctionError};
pub use worker::{
    DrawCall, DrawPort, Eye, FrameBuffers, Layers, StereoMode, Worker, WorkerSettings,
};

/// Failures that stop the master.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    /// A broadcast or barrier did not complete.
    #[error("cluster link failed: {0}")]
    Link(#[from] LinkError),
}

/// Failures that stop a render worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Receiving a block or reaching a barrier failed.
    #[error("cluster link failed: {0}")]
    Link(#[from] LinkError),
    /// This host has no usable entry in the topology.
    #[error("topology: {0}")]
    Topology(#[from] TopologyError),
    /// The resolution scale gives a window an empty or oversized frame
    /// buffer.
    #[error("cannot allocate frame buffers for window {window} ({width}x{height}) at scale {scale:?}")]
    FrameBuffer {
        /// Window index within the node.
        window: usize,
        /// Window width in pixels.
        width: u32,
        /// Window height in pixels.
        height: u32,
        /// Resolution scale in effect.
        scale: [f32; 2],
    },
    /// The drawing backend reported a failure.
    #[error("draw failed: {0}")]
    Draw(String),
}
