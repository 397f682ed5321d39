// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CaveWall entrypoint.
//!
//! One binary plays every role:
//!
//! ```text
//! cavewall master              # hub + sync loop + tracking loop
//! cavewall worker              # connect to the master and render this host's node
//! cavewall local --workers 3   # master and workers in one process
//! cavewall topology            # validate and print the layout
//! ```
//!
//! Preferences come from the platform config directory (or `--config-dir`)
//! and are created with defaults on first run; flags override them.

// The topology command prints to stdout.
#![allow(clippy::print_stdout)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wall_app_core::config::ConfigService;
use wall_app_core::prefs::{MasterPrefs, WorkerPrefs, MASTER_PREFS_KEY, WORKER_PREFS_KEY};
use wall_cluster::{
    ClusterContext, Master, MasterHandle, NullTracker, TraceDrawPort, Tracker, Worker,
};
use wall_config_fs::FsConfigStore;
use wall_geom::{Topology, TopologyDoc};
use wall_link::local::in_process;
use wall_link::tcp::{TcpHub, TcpWorkerLink};

/// Window size used when no topology document is given.
const DEFAULT_WINDOW: (u32, u32) = (1280, 720);

#[derive(Parser, Debug)]
#[command(author, version, about = "Frame-locked cluster rendering for a CAVE display wall")]
struct Cli {
    /// Topology document (JSON). Without one, a single wall on this host is used.
    #[arg(long, global = true)]
    topology: Option<PathBuf>,

    /// Directory holding preference files.
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Accept workers and drive the cluster.
    Master {
        /// Address to listen on.
        #[arg(long)]
        listen: Option<String>,
        /// Workers to wait for.
        #[arg(long)]
        workers: Option<usize>,
        /// Use the tracked head as the eye point.
        #[arg(long)]
        head_tracking: bool,
    },
    /// Connect to a master and render this host's node.
    Worker {
        /// Master hub address.
        #[arg(long)]
        master: Option<String>,
        /// Hostname used for topology lookup.
        #[arg(long)]
        hostname: Option<String>,
        /// Start in interlaced stereo.
        #[arg(long)]
        stereo: bool,
    },
    /// Run a master and in-process workers.
    Local {
        /// Worker count; defaults to one per topology node.
        #[arg(long)]
        workers: Option<usize>,
        /// Stop after this many frames.
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Validate the topology and print it.
    Topology {
        /// Print a starter document instead.
        #[arg(long)]
        template: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err:#}");
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = cli.config_dir.as_deref();
    match cli.mode {
        Mode::Master {
            listen,
            workers,
            head_tracking,
        } => {
            let mut prefs: MasterPrefs = load_prefs(config_dir, MASTER_PREFS_KEY);
            if let Some(listen) = listen {
                prefs.listen_addr = listen;
            }
            if let Some(workers) = workers {
                prefs.workers = workers;
            }
            prefs.head_tracking |= head_tracking;
            let topology = load_topology(cli.topology.as_deref(), &local_hostname(None))?;
            let ctx = ClusterContext::new(topology)
                .load_alternates(&prefs.alternate_transfer_functions)?
                .with_master_prefs(prefs);
            run_master(ctx).await
        }
        Mode::Worker {
            master,
            hostname,
            stereo,
        } => {
            let mut prefs: WorkerPrefs = load_prefs(config_dir, WORKER_PREFS_KEY);
            if let Some(master) = master {
                prefs.master_addr = master;
            }
            prefs.stereo |= stereo;
            let hostname = local_hostname(hostname.or_else(|| prefs.hostname.clone()));
            let topology = load_topology(cli.topology.as_deref(), &hostname)?;
            let ctx = ClusterContext::new(topology)
                .load_alternates(&prefs.alternate_transfer_functions)?
                .with_worker_prefs(prefs);
            run_worker(ctx, &hostname).await
        }
        Mode::Local { workers, ticks } => {
            let master: MasterPrefs = load_prefs(config_dir, MASTER_PREFS_KEY);
            let worker: WorkerPrefs = load_prefs(config_dir, WORKER_PREFS_KEY);
            let topology = load_topology(cli.topology.as_deref(), &local_hostname(None))?;
            let ctx = ClusterContext::new(topology)
                .load_alternates(&master.alternate_transfer_functions)?
                .with_master_prefs(master)
                .with_worker_prefs(worker);
            run_local(ctx, workers, ticks).await
        }
        Mode::Topology { template } => {
            if template {
                let doc = TopologyDoc::single_wall(
                    &local_hostname(None),
                    DEFAULT_WINDOW.0,
                    DEFAULT_WINDOW.1,
                );
                println!("{}", doc.to_json()?);
            } else {
                let topology = load_topology(cli.topology.as_deref(), &local_hostname(None))?;
                print!("{topology}");
            }
            Ok(())
        }
    }
}

/// Loads stored prefs, creating them with defaults on first run. Any store
/// failure falls back to defaults.
fn load_prefs<T>(dir: Option<&Path>, key: &str) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    let store = match dir {
        Some(dir) => FsConfigStore::at(dir),
        None => FsConfigStore::new(),
    };
    let service = match store {
        Ok(store) => ConfigService::new(store),
        Err(err) => {
            warn!(%err, "config store unavailable; using defaults");
            return T::default();
        }
    };
    match service.load_or_init(key) {
        Ok((prefs, None)) => prefs,
        Ok((prefs, Some(err))) => {
            warn!(%err, key, "could not persist default prefs");
            prefs
        }
        Err(err) => {
            warn!(%err, key, "unreadable prefs; using defaults");
            T::default()
        }
    }
}

fn load_topology(path: Option<&Path>, hostname: &str) -> Result<Topology> {
    match path {
        Some(path) => Topology::load(path)
            .with_context(|| format!("loading topology from {}", path.display())),
        None => {
            let doc = TopologyDoc::single_wall(hostname, DEFAULT_WINDOW.0, DEFAULT_WINDOW.1);
            Ok(Topology::from_doc(&doc)?)
        }
    }
}

fn local_hostname(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("HOSTNAME").ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}

/// Stops the cluster on the first interrupt.
fn stop_on_interrupt(handle: MasterHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received; stopping");
                handle.stop();
            }
            Err(err) => warn!(%err, "cannot listen for interrupts"),
        }
    });
}

async fn run_master(ctx: ClusterContext) -> Result<()> {
    let prefs = ctx.master_prefs().clone();
    let hub = TcpHub::bind(prefs.listen_addr.as_str())
        .await
        .with_context(|| format!("binding {}", prefs.listen_addr))?;
    info!(addr = %hub.local_addr()?, workers = prefs.workers, "waiting for workers");
    let link = hub.accept(prefs.workers).await?;
    info!(hosts = ?link.hostnames(), "all workers joined");

    let (mut master, handle) = Master::new(&ctx, link);
    stop_on_interrupt(handle.clone());
    let mut tracker = Tracker::new(&ctx, handle, NullTracker);
    let tracking = tokio::spawn(async move { tracker.run().await });
    master.run().await?;
    tracking.await?;
    Ok(())
}

async fn run_worker(ctx: ClusterContext, hostname: &str) -> Result<()> {
    let addr = ctx.worker_prefs().master_addr.clone();
    let link = TcpWorkerLink::connect(addr.as_str(), hostname)
        .await
        .with_context(|| format!("connecting to master at {addr}"))?;
    let mut worker = Worker::new(&ctx, link, TraceDrawPort::new(), hostname)?;
    worker.run().await?;
    Ok(())
}

async fn run_local(ctx: ClusterContext, workers: Option<usize>, ticks: Option<u64>) -> Result<()> {
    let hosts: Vec<String> = ctx
        .topology()
        .nodes()
        .iter()
        .map(|n| n.hostname.clone())
        .collect();
    let count = workers.unwrap_or(hosts.len()).max(1);
    let (link, links) = in_process(count);

    let mut tasks = Vec::with_capacity(count);
    for (i, link) in links.into_iter().enumerate() {
        let hostname = hosts.get(i % hosts.len().max(1)).cloned().unwrap_or_default();
        let mut worker = Worker::new(&ctx, link, TraceDrawPort::new(), &hostname)?;
        tasks.push(tokio::spawn(async move { worker.run().await }));
    }

    let (mut master, handle) = Master::new(&ctx, link);
    stop_on_interrupt(handle.clone());
    let mut tracker = Tracker::new(&ctx, handle.clone(), NullTracker);
    let tracking = tokio::spawn(async move { tracker.run().await });
    if let Some(ticks) = ticks {
        for _ in 0..ticks {
            master.tick().await?;
        }
        handle.stop();
    }
    master.run().await?;
    tracking.await?;
    for task in tasks {
        task.await??;
    }
    info!(workers = count, "local cluster finished");
    Ok(())
}
