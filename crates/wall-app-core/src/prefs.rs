// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stored preferences for the master and render workers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Config key for [`MasterPrefs`].
pub const MASTER_PREFS_KEY: &str = "master";
/// Config key for [`WorkerPrefs`].
pub const WORKER_PREFS_KEY: &str = "worker";

/// Default eye separation in world units.
pub const DEFAULT_STEREO_DISPARITY: f32 = 1.05 * 0.125;

/// Master process settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterPrefs {
    /// Address the worker hub listens on.
    pub listen_addr: String,
    /// Workers to wait for before the first tick.
    pub workers: usize,
    /// Tracking loop frequency in Hz.
    pub tracker_hz: f64,
    /// Minimum seconds between command / transfer-function flushes.
    pub flush_interval_secs: f64,
    /// Use the tracked head as the eye point when fresh.
    pub head_tracking: bool,
    /// Height of the standing-operator eye in feet.
    pub eye_height_ft: f32,
    /// Transfer-function text files available for cross-fading.
    pub alternate_transfer_functions: Vec<PathBuf>,
    /// Navigation filter tuning.
    pub navigation: NavigationPrefs,
}

impl Default for MasterPrefs {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7400".into(),
            workers: 1,
            tracker_hz: 80.0,
            flush_interval_secs: 1.0 / 15.0,
            head_tracking: false,
            eye_height_ft: 5.0,
            alternate_transfer_functions: Vec::new(),
            navigation: NavigationPrefs::default(),
        }
    }
}

/// Render worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPrefs {
    /// Address of the master hub.
    pub master_addr: String,
    /// Overrides the OS hostname for topology lookup.
    pub hostname: Option<String>,
    /// Start in interlaced stereo.
    pub stereo: bool,
    /// Initial eye separation.
    pub stereo_disparity: f32,
    /// Initial resolution scale per axis (values >= 10 are pixel sizes).
    pub res_scale: [f32; 2],
    /// Transfer-function text files available for cross-fading, in the same
    /// order as the master's list.
    pub alternate_transfer_functions: Vec<PathBuf>,
}

impl Default for WorkerPrefs {
    fn default() -> Self {
        Self {
            master_addr: "127.0.0.1:7400".into(),
            hostname: None,
            stereo: false,
            stereo_disparity: DEFAULT_STEREO_DISPARITY,
            res_scale: [1.0, 1.0],
            alternate_transfer_functions: Vec::new(),
        }
    }
}

/// Navigation filter tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationPrefs {
    /// Exponential smoothing rate per second; alpha = rate * dt.
    pub smoothing_rate: f32,
    /// Translation speed applied to the smoothed move vector.
    pub move_speed: f32,
    /// Rotation speed in radians per second per radian of offset.
    pub rotate_speed: f32,
    /// Per-component clamp on both raw offsets: radians for rotation, grid
    /// units for translation.
    pub max_rotation: f32,
}

impl Default for NavigationPrefs {
    fn default() -> Self {
        Self {
            smoothing_rate: 8.0,
            move_speed: 2.9,
            rotate_speed: (0.8 * 15.0f32).to_radians(),
            max_rotation: (2.5 * 0.76 * 30.0f32).to_radians(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fill_defaults() {
        let prefs: MasterPrefs = serde_json::from_str(r#"{ "workers": 6 }"#).unwrap();
        assert_eq!(prefs.workers, 6);
        assert_eq!(prefs.listen_addr, MasterPrefs::default().listen_addr);
        assert_eq!(prefs.navigation, NavigationPrefs::default());
    }

    #[test]
    fn worker_defaults() {
        let prefs = WorkerPrefs::default();
        assert!(!prefs.stereo);
        assert!((prefs.stereo_disparity - 0.13125).abs() < 1e-6);
    }
}
