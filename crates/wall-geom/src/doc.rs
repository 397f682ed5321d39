// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use serde::{Deserialize, Serialize};

use crate::FEET_TO_GRID;

fn default_world_scale() -> f32 {
    FEET_TO_GRID
}

/// On-disk topology description.
///
/// World corners are in feet; [`crate::Topology::from_doc`] multiplies them by
/// `world_scale` when building the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyDoc {
    /// Grid units per document unit.
    #[serde(default = "default_world_scale")]
    pub world_scale: f32,
    /// Physical display nodes, in rank order.
    pub nodes: Vec<NodeDoc>,
}

/// One physical host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDoc {
    /// Hostname a worker matches against its own.
    pub hostname: String,
    /// Windows opened on this host.
    pub windows: Vec<WindowDoc>,
}

/// One display window on a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDoc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Screen offset of the window's top-left corner.
    #[serde(default)]
    pub offset: [i32; 2],
    /// Whether the window covers the whole screen.
    #[serde(default)]
    pub fullscreen: bool,
    /// Surfaces drawn into this window.
    pub surfaces: Vec<SurfaceDoc>,
}

/// One projection quad inside a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceDoc {
    /// Bottom-left corner in window pixels.
    pub pixel_bottom_left: [u32; 2],
    /// Top-right corner in window pixels.
    pub pixel_top_right: [u32; 2],
    /// Bottom-left world corner (feet).
    pub bottom_left: [f32; 3],
    /// Top-right world corner (feet).
    pub top_right: [f32; 3],
    /// Optional top-left world corner (feet); derived when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_left: Option<[f32; 3]>,
    /// Optional bottom-right world corner (feet); derived when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_right: Option<[f32; 3]>,
}

impl TopologyDoc {
    /// Parses a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serializes the document as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// A single host with one full-window surface facing the viewer.
    ///
    /// Used by the single-host demo when no document is supplied.
    pub fn single_wall(hostname: &str, width: u32, height: u32) -> Self {
        Self {
            world_scale: FEET_TO_GRID,
            nodes: vec![NodeDoc {
                hostname: hostname.to_owned(),
                windows: vec![WindowDoc {
                    width,
                    height,
                    offset: [0, 0],
                    fullscreen: false,
                    surfaces: vec![SurfaceDoc {
                        pixel_bottom_left: [0, 0],
                        pixel_top_right: [width.saturating_sub(1), height.saturating_sub(1)],
                        bottom_left: [-5.0, 0.0, -5.0],
                        top_right: [5.0, 10.0, -5.0],
                        top_left: None,
                        bottom_right: None,
                    }],
                }],
            }],
        }
    }
}
