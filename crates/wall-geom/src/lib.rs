// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![doc = r"Topology model for the display wall.

This crate provides:
- Projection surfaces (`RenderSurface`) with world corners, normalized pixel
  corners and a derived orthonormal basis.
- Windows (`RenderWindow`) and physical nodes (`Node`) grouping surfaces.
- A JSON topology document (`TopologyDoc`) and the validated, immutable
  `Topology` built from it.

Design notes:
- The topology is built once at startup and never mutated; per-frame motion is
  applied by deriving transformed copies of surfaces.
- Float32 throughout, matching the matrices replicated to render workers.
"]

/// Serializable topology document and its conversion into the model.
pub mod doc;
/// Projection surfaces and their bases.
pub mod surface;
/// Nodes, windows, and the validated topology.
pub mod topology;

pub use doc::{NodeDoc, SurfaceDoc, TopologyDoc, WindowDoc};
pub use surface::{RenderSurface, SurfaceError};
pub use topology::{Node, RenderWindow, Topology};

/// World units per foot; surface corners and tracker positions arrive in feet.
pub const FEET_TO_GRID: f32 = 2.0;

/// Errors raised while building or querying the topology.
///
/// Every variant is a configuration error: the process cannot render a
/// consistent wall from a topology that fails validation.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// The topology document could not be read.
    #[error("could not read topology document: {0}")]
    Io(#[from] std::io::Error),
    /// The topology document is not valid JSON for the schema.
    #[error("malformed topology document: {0}")]
    Parse(#[from] serde_json::Error),
    /// The document declares no nodes.
    #[error("topology declares no nodes")]
    NoNodes,
    /// A node has an empty hostname.
    #[error("node #{node} has an empty hostname")]
    EmptyHostname {
        /// Index of the node in the document.
        node: usize,
    },
    /// A node declares no windows.
    #[error("node '{hostname}' declares no windows")]
    NoWindows {
        /// Hostname of the offending node.
        hostname: String,
    },
    /// A window declares no surfaces.
    #[error("window #{window} of node '{hostname}' declares no surfaces")]
    NoSurfaces {
        /// Hostname of the offending node.
        hostname: String,
        /// Index of the window within the node.
        window: usize,
    },
    /// A window is smaller than 2×2 pixels.
    #[error("window #{window} of node '{hostname}' is too small: {width}x{height}")]
    WindowTooSmall {
        /// Hostname of the offending node.
        hostname: String,
        /// Index of the window within the node.
        window: usize,
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
    },
    /// A surface failed geometric validation.
    #[error("surface #{surface} of window #{window} on node '{hostname}': {reason}")]
    InvalidSurface {
        /// Hostname of the offending node.
        hostname: String,
        /// Index of the window within the node.
        window: usize,
        /// Index of the surface within the window.
        surface: usize,
        /// What is wrong with the surface.
        #[source]
        reason: SurfaceError,
    },
    /// No node entry matches this worker's hostname.
    #[error("host '{0}' has no entry in the topology")]
    UnknownHost(String),
}
