// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::fmt;
use std::path::Path;

use wall_math::Vec3;

use crate::doc::{NodeDoc, SurfaceDoc, TopologyDoc, WindowDoc};
use crate::{RenderSurface, TopologyError};

/// A display window and the surfaces it drives.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderWindow {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Screen offset of the window.
    pub offset: [i32; 2],
    /// Full-screen flag.
    pub fullscreen: bool,
    /// Surfaces in draw order.
    pub surfaces: Vec<RenderSurface>,
}

/// A physical host and its windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Host identity.
    pub hostname: String,
    /// Windows in open order.
    pub windows: Vec<RenderWindow>,
}

impl Node {
    /// Total surfaces across every window of the node.
    pub fn surface_count(&self) -> usize {
        self.windows.iter().map(|w| w.surfaces.len()).sum()
    }
}

/// Validated, immutable cluster topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    nodes: Vec<Node>,
}

impl Topology {
    /// Builds and validates the model from a document.
    pub fn from_doc(doc: &TopologyDoc) -> Result<Self, TopologyError> {
        if doc.nodes.is_empty() {
            return Err(TopologyError::NoNodes);
        }
        let nodes = doc
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| build_node(idx, node, doc.world_scale))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { nodes })
    }

    /// Parses and validates a JSON document.
    pub fn from_json(text: &str) -> Result<Self, TopologyError> {
        let doc = TopologyDoc::from_json(text)?;
        Self::from_doc(&doc)
    }

    /// Reads, parses and validates a JSON document on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// All nodes in document order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node at `index`, if any.
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Selects the node a worker serves.
    ///
    /// When several entries share `hostname`, the worker with `rank` takes
    /// entry `rank % count` among them, so co-located workers split the
    /// entries deterministically.
    pub fn node_for(&self, hostname: &str, rank: usize) -> Result<&Node, TopologyError> {
        let matching: Vec<&Node> = self
            .nodes
            .iter()
            .filter(|n| n.hostname == hostname)
            .collect();
        if matching.is_empty() {
            return Err(TopologyError::UnknownHost(hostname.to_owned()));
        }
        Ok(matching[rank % matching.len()])
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} node(s)", self.nodes.len())?;
        for node in &self.nodes {
            writeln!(f, "{}", node.hostname)?;
            for (wi, window) in node.windows.iter().enumerate() {
                writeln!(
                    f,
                    "  window {wi}: {}x{} at ({}, {}){}",
                    window.width,
                    window.height,
                    window.offset[0],
                    window.offset[1],
                    if window.fullscreen { " fullscreen" } else { "" }
                )?;
                for (si, s) in window.surfaces.iter().enumerate() {
                    let bl = s.bottom_left().to_array();
                    let tr = s.top_right().to_array();
                    let w = s.w().to_array();
                    writeln!(
                        f,
                        "    surface {si}: bl {bl:?} tr {tr:?} normal {w:?}"
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn build_node(idx: usize, doc: &NodeDoc, scale: f32) -> Result<Node, TopologyError> {
    if doc.hostname.trim().is_empty() {
        return Err(TopologyError::EmptyHostname { node: idx });
    }
    if doc.windows.is_empty() {
        return Err(TopologyError::NoWindows {
            hostname: doc.hostname.clone(),
        });
    }
    let windows = doc
        .windows
        .iter()
        .enumerate()
        .map(|(wi, w)| build_window(&doc.hostname, wi, w, scale))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Node {
        hostname: doc.hostname.clone(),
        windows,
    })
}

fn build_window(
    hostname: &str,
    index: usize,
    doc: &WindowDoc,
    scale: f32,
) -> Result<RenderWindow, TopologyError> {
    if doc.width < 2 || doc.height < 2 {
        return Err(TopologyError::WindowTooSmall {
            hostname: hostname.to_owned(),
            window: index,
            width: doc.width,
            height: doc.height,
        });
    }
    if doc.surfaces.is_empty() {
        return Err(TopologyError::NoSurfaces {
            hostname: hostname.to_owned(),
            window: index,
        });
    }
    let surfaces = doc
        .surfaces
        .iter()
        .enumerate()
        .map(|(si, s)| {
            build_surface(s, scale, doc.width, doc.height).map_err(|reason| {
                TopologyError::InvalidSurface {
                    hostname: hostname.to_owned(),
                    window: index,
                    surface: si,
                    reason,
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RenderWindow {
        width: doc.width,
        height: doc.height,
        offset: doc.offset,
        fullscreen: doc.fullscreen,
        surfaces,
    })
}

fn build_surface(
    doc: &SurfaceDoc,
    scale: f32,
    width: u32,
    height: u32,
) -> Result<RenderSurface, crate::SurfaceError> {
    let world = |c: [f32; 3]| Vec3::from(c).scale(scale);
    let surface = RenderSurface::from_world_corners(
        world(doc.bottom_left),
        world(doc.top_right),
        doc.top_left.map(world),
        doc.bottom_right.map(world),
    )?;
    Ok(surface.with_pixel_corners(doc.pixel_bottom_left, doc.pixel_top_right, width, height))
}
