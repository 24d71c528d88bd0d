//! Published events and the broadcast hand-off
//!
//! Everything the bridge tells its clients goes through [`Broadcaster`] as a
//! JSON string. The channel is bounded and submission never blocks: a slow or
//! absent consumer costs events, not serial read latency.

use std::collections::BTreeMap;

use rig_protocol::RigProto;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the publish channel; chunks beyond it are dropped
pub const BROADCAST_CAPACITY: usize = 100;

/// Non-blocking publisher handle shared by the registry and supervisor
#[derive(Clone)]
pub struct Broadcaster {
    tx: mpsc::Sender<String>,
}

impl Broadcaster {
    /// Create a publisher and the receiver its consumer drains
    pub fn channel() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(BROADCAST_CAPACITY);
        (Self { tx }, rx)
    }

    /// Serialize and submit an event; drops it if the channel is full
    pub fn publish<T: Serialize>(&self, event: &T) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize event: {e}");
                return;
            }
        };
        if self.tx.try_send(json).is_err() {
            debug!("broadcast channel full, event dropped");
        }
    }
}

/// Events pushed to all connected clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// Reconciled rig state changed
    #[serde(rename = "rig")]
    Rig {
        /// Protocol label of the contributing port
        rig: RigProto,
        /// Frequency in Hz; absent until first observed
        #[serde(skip_serializing_if = "Option::is_none")]
        freq: Option<i64>,
        /// Display mode; absent until first observed
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<&'static str>,
        /// Data-mode sub-flag; present whenever the mode is
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<bool>,
    },

    /// Pseudo-tty slave paths, one entry per configured slot
    #[serde(rename = "pty")]
    Pty {
        /// Slave device paths; empty string for disabled/unsupported slots
        paths: Vec<String>,
    },
}

/// Serialized form of one port's state for snapshot queries
#[derive(Debug, Clone, Serialize)]
pub struct PortSnapshot {
    /// Frequency in Hz; zero until first observed
    pub freq: i64,
    /// Mode label; empty until first observed
    pub mode: String,
    /// Data-mode sub-flag
    pub data: bool,
    /// Detected protocol
    pub proto: RigProto,
}

/// Reply to a client snapshot query
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SnapshotReply {
    /// State of one initialized port
    #[serde(rename = "rigState")]
    RigState {
        /// Queried slot index
        port: usize,
        /// Frequency in Hz
        freq: i64,
        /// Mode label; empty until first observed
        mode: String,
        /// Data-mode sub-flag
        data: bool,
        /// Detected protocol
        proto: RigProto,
    },

    /// States of all initialized ports, keyed by slot index
    #[serde(rename = "rigStates")]
    RigStates {
        /// Slot index (as string) to state
        states: BTreeMap<String, PortSnapshot>,
    },

    /// Query failed
    #[serde(rename = "error")]
    Error {
        /// Human-readable reason
        error: String,
    },
}
