//! Rig supervisor
//!
//! Owns the lifecycle of every port worker: spawning from configuration,
//! live reconfiguration (full restart on port/baud/PTY changes), and routing
//! AI1 re-arm requests to running CAT ports. The supervisor is also where
//! PTY mode is decided: unsupported platforms degrade to direct mode with a
//! warning instead of failing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rig_protocol::RigProto;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{BridgeConfig, MAX_PORTS};
use crate::events::{BridgeEvent, Broadcaster};
use crate::pty;
use crate::registry::{PublishPolicy, RegistryConfig, RigRegistry};
use crate::worker::{PortWorker, WorkerCommand};

/// How long workers get to wind down during a restart
const QUIESCE_GRACE: Duration = Duration::from_millis(500);

/// Capacity of each worker's command channel
const COMMAND_CAPACITY: usize = 8;

struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    task: JoinHandle<()>,
}

/// Spawns and supervises the per-port watchers
pub struct RigSupervisor {
    registry: Arc<RigRegistry>,
    broadcaster: Broadcaster,
    config: std::sync::Mutex<BridgeConfig>,
    workers: tokio::sync::Mutex<HashMap<usize, WorkerHandle>>,
    pty_paths: std::sync::Mutex<Vec<String>>,
}

impl RigSupervisor {
    /// Build a supervisor publishing through the given broadcaster
    pub fn new(config: BridgeConfig, broadcaster: Broadcaster) -> Self {
        let policy = PublishPolicy {
            mode: config.rig_broadcast_mode,
            selected_index: config.selected_rig_index,
        };
        let registry = Arc::new(RigRegistry::new(
            RegistryConfig::default(),
            policy,
            broadcaster.clone(),
        ));
        Self {
            registry,
            broadcaster,
            config: std::sync::Mutex::new(config),
            workers: tokio::sync::Mutex::new(HashMap::new()),
            pty_paths: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// The shared state registry, for snapshot queries
    pub fn registry(&self) -> Arc<RigRegistry> {
        self.registry.clone()
    }

    /// Current pty slave paths, one entry per configured slot
    pub fn pty_paths(&self) -> Vec<String> {
        self.pty_paths.lock().unwrap().clone()
    }

    /// Spawn workers for every enabled port slot
    pub async fn start(&self) {
        let config = self.config.lock().unwrap().clone();
        if !config.use_rig {
            info!("rig watcher disabled");
            return;
        }

        let slots: Vec<(usize, crate::config::RigPortConfig)> = config
            .enabled_ports()
            .map(|(i, rp)| (i, rp.clone()))
            .collect();
        if slots.is_empty() {
            info!("no rig ports configured");
            return;
        }

        info!(
            "rig broadcast mode: {:?}, selected index: {}",
            config.rig_broadcast_mode, config.selected_rig_index
        );

        let use_pty = config.use_pty && pty::supported();
        if config.use_pty && !use_pty {
            warn!("pseudo-tty mode unsupported on this platform, using direct mode");
        }

        let mut paths = vec![String::new(); config.rig_ports.len().min(MAX_PORTS)];
        let mut workers = self.workers.lock().await;

        for (index, rp) in slots {
            let baud = rp.effective_baud();
            info!("rig[{index}]: open {} @ {} baud", rp.port, baud);

            let link = if use_pty {
                match pty::open_router(index) {
                    Ok((path, link)) => {
                        info!("rig[{index}]: pty created: {path}");
                        paths[index] = path;
                        Some(link)
                    }
                    Err(e) => {
                        warn!("rig[{index}]: pty open failed: {e}");
                        continue;
                    }
                }
            } else {
                None
            };

            let worker = match PortWorker::connect(index, &rp.port, baud, self.registry(), link) {
                Ok(worker) => worker,
                Err(e) => {
                    warn!("rig[{index}]: {e}");
                    continue;
                }
            };

            let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
            let task = tokio::spawn(worker.run(rx));
            workers.insert(index, WorkerHandle { commands: tx, task });
        }
        drop(workers);

        if use_pty {
            *self.pty_paths.lock().unwrap() = paths.clone();
            self.broadcaster.publish(&BridgeEvent::Pty { paths });
            info!("pty paths published for external logging applications");
        }
    }

    /// Stop every worker and wait for them to wind down
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        for handle in workers.values() {
            let _ = handle.commands.send(WorkerCommand::Shutdown).await;
        }
        for (index, handle) in workers.drain() {
            if tokio::time::timeout(QUIESCE_GRACE, handle.task).await.is_err() {
                warn!("rig[{index}]: worker did not stop within the grace period");
            }
        }
        self.pty_paths.lock().unwrap().clear();
        info!("rig watcher stopped");
    }

    /// Apply new settings: stop everything, swap the config, relaunch
    pub async fn restart(&self, new_config: BridgeConfig) {
        info!("rig watcher restarting with new configuration");
        self.shutdown().await;
        self.registry.set_policy(PublishPolicy {
            mode: new_config.rig_broadcast_mode,
            selected_index: new_config.selected_rig_index,
        });
        *self.config.lock().unwrap() = new_config;
        self.start().await;
    }

    /// Re-enable Auto-Information on CAT ports.
    ///
    /// External apps sharing the rig commonly send `AI0;`; this puts the rig
    /// back into push mode after the operator saves settings.
    pub async fn rearm_auto_info(&self) {
        if self.registry.global_proto() != RigProto::Cat {
            return;
        }
        let workers = self.workers.lock().await;
        for handle in workers.values() {
            let _ = handle.commands.send(WorkerCommand::RearmAutoInfo).await;
        }
    }
}
