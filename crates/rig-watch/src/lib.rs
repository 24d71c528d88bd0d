//! Rig Watcher Engine
//!
//! This crate runs the serial side of the bridge: it opens each configured
//! rig port, auto-classifies the stream as CI-V or CAT, keeps a reconciled
//! global rig state across up to four simultaneous rigs, and publishes
//! state-change events for the client fan-out. On POSIX systems it can also
//! mirror each port through a pseudo-tty pair so external logging
//! applications share the physical rig with the bridge.
//!
//! # Architecture
//!
//! ```text
//! serial bytes → PortWorker (detect + frame) → RigRegistry → Broadcaster
//!                    ↕ (PTY mode)
//!                external app
//! ```
//!
//! - [`worker::PortWorker`]: one per enabled port; owns the stream, drives
//!   protocol detection, probing, and the AI1-vs-polling fallback
//! - [`registry::RigRegistry`]: per-port and reconciled state, change
//!   detection, cross-port arbitration, duplicate elision
//! - [`pty`]: optional pseudo-tty mirroring (POSIX only)
//! - [`supervisor::RigSupervisor`]: spawning, live reconfiguration, AI1
//!   re-arm routing
//!
//! The rig subsystem is best-effort end to end: a missing or failing rig
//! never takes the bridge down, it only stops `"type":"rig"` events.

pub mod config;
pub mod error;
pub mod events;
pub mod pty;
pub mod registry;
pub mod supervisor;
pub mod worker;

pub use config::{BridgeConfig, BroadcastMode, RigPortConfig, MAX_PORTS};
pub use error::WatchError;
pub use events::{BridgeEvent, Broadcaster, SnapshotReply};
pub use registry::{PortState, PublishPolicy, RegistryConfig, RigRegistry, StateUpdate};
pub use supervisor::RigSupervisor;
pub use worker::{PortWorker, WorkerCommand};
