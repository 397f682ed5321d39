// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Everything a master or worker needs at construction, in one place.

use std::path::PathBuf;
use std::sync::Arc;

use wall_app_core::prefs::{MasterPrefs, WorkerPrefs};
use wall_geom::Topology;

use crate::transfer::{TransferFunction, TransferFunctionError};

/// Immutable cluster setup shared by the master, tracker and workers.
///
/// Cloning is cheap; the topology and alternates are reference counted.
#[derive(Debug, Clone)]
pub struct ClusterContext {
    topology: Arc<Topology>,
    master: MasterPrefs,
    worker: WorkerPrefs,
    alternates: Arc<[TransferFunction]>,
}

impl ClusterContext {
    /// Context with default preferences and no alternate transfer functions.
    pub fn new(topology: Topology) -> Self {
        Self {
            topology: Arc::new(topology),
            master: MasterPrefs::default(),
            worker: WorkerPrefs::default(),
            alternates: Arc::from(Vec::new()),
        }
    }

    /// Replaces the master preferences.
    #[must_use]
    pub fn with_master_prefs(mut self, prefs: MasterPrefs) -> Self {
        self.master = prefs;
        self
    }

    /// Replaces the worker preferences.
    #[must_use]
    pub fn with_worker_prefs(mut self, prefs: WorkerPrefs) -> Self {
        self.worker = prefs;
        self
    }

    /// Replaces the alternate transfer functions. Cross-fade targets index
    /// into this list, so master and workers must agree on it.
    #[must_use]
    pub fn with_alternates(mut self, alternates: Vec<TransferFunction>) -> Self {
        self.alternates = Arc::from(alternates);
        self
    }

    /// Loads alternates from text files, in order.
    pub fn load_alternates(self, paths: &[PathBuf]) -> Result<Self, TransferFunctionError> {
        let alternates = paths
            .iter()
            .map(TransferFunction::load)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_alternates(alternates))
    }

    /// Static cluster layout.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Master preferences.
    pub fn master_prefs(&self) -> &MasterPrefs {
        &self.master
    }

    /// Worker preferences.
    pub fn worker_prefs(&self) -> &WorkerPrefs {
        &self.worker
    }

    /// Alternate transfer functions available for cross-fading.
    pub fn alternates(&self) -> &Arc<[TransferFunction]> {
        &self.alternates
    }
}
