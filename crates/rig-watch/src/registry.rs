//! Rig state registry
//!
//! Tracks per-port state for every watched serial port plus the single
//! reconciled view the bridge publishes. All mutation funnels through
//! [`RigRegistry::apply`], which layers three filters before anything reaches
//! the wire:
//!
//! 1. change detection per port (frequency deadband, mode/data comparison),
//! 2. a cross-port flap guard so transceive chatter from an idle rig cannot
//!    steal the global view from the rig the operator is actually turning,
//! 3. duplicate elision against the last published tuple.
//!
//! Each map/state lives behind its own lock; no two are ever held at once and
//! events are submitted only after every lock is released.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use rig_protocol::{display_mode, RigMode, RigProto};
use tokio::time::Instant;
use tracing::debug;

use crate::config::BroadcastMode;
use crate::events::{BridgeEvent, Broadcaster, PortSnapshot, SnapshotReply};

/// Tuning knobs for change detection and arbitration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Minimum frequency movement that counts as a change
    pub freq_deadband_hz: i64,
    /// Window during which another port's frequency-only updates are ignored
    pub flap_guard: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            freq_deadband_hz: 100,
            flap_guard: Duration::from_millis(500),
        }
    }
}

/// Which ports are allowed to feed the global state
#[derive(Debug, Clone, Copy)]
pub struct PublishPolicy {
    /// All ports or only the selected one
    pub mode: BroadcastMode,
    /// Selected slot for [`BroadcastMode::Single`]
    pub selected_index: usize,
}

impl PublishPolicy {
    /// Whether updates from the given slot may reach the global state
    pub fn allows(&self, index: usize) -> bool {
        match self.mode {
            BroadcastMode::All => true,
            BroadcastMode::Single => index == self.selected_index,
        }
    }
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            mode: BroadcastMode::All,
            selected_index: 0,
        }
    }
}

/// State of one watched port
#[derive(Debug, Clone)]
pub struct PortState {
    /// Slot index
    pub index: usize,
    /// Frequency in Hz; zero until first observed
    pub freq: i64,
    /// Operating mode; `None` until first observed
    pub mode: Option<RigMode>,
    /// Data-mode sub-flag
    pub data: bool,
    /// Detected protocol
    pub proto: RigProto,
}

impl PortState {
    fn new(index: usize) -> Self {
        Self {
            index,
            freq: 0,
            mode: None,
            data: false,
            proto: RigProto::Unknown,
        }
    }

    fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            freq: self.freq,
            mode: self.mode.map(|m| m.as_str().to_string()).unwrap_or_default(),
            data: self.data,
            proto: self.proto,
        }
    }
}

/// One decoded observation from a port
#[derive(Debug, Clone, Copy)]
pub struct StateUpdate {
    /// New frequency, when the frame carried one (zero is ignored)
    pub freq: Option<i64>,
    /// New mode and data flag, when the frame carried them
    pub mode: Option<(RigMode, bool)>,
    /// Protocol the frame arrived under
    pub proto: RigProto,
}

impl StateUpdate {
    /// Frequency-only observation
    pub fn frequency(proto: RigProto, hz: i64) -> Self {
        Self {
            freq: Some(hz),
            mode: None,
            proto,
        }
    }

    /// Mode-only observation
    pub fn mode(proto: RigProto, mode: RigMode, data: bool) -> Self {
        Self {
            freq: None,
            mode: Some((mode, data)),
            proto,
        }
    }

    /// Combined observation (CAT `IF` reports)
    pub fn status(proto: RigProto, freq: Option<i64>, mode: Option<(RigMode, bool)>) -> Self {
        Self { freq, mode, proto }
    }
}

type BroadcastKey = (i64, Option<RigMode>, bool, RigProto);

#[derive(Debug)]
struct GlobalInner {
    state: PortState,
    last_broadcast: Option<BroadcastKey>,
}

#[derive(Debug, Default)]
struct Arbitration {
    /// Port that last won an update, and when
    last: Option<(usize, Instant)>,
}

/// Shared registry of per-port and reconciled rig state
pub struct RigRegistry {
    cfg: RegistryConfig,
    policy: RwLock<PublishPolicy>,
    ports: RwLock<HashMap<usize, PortState>>,
    global: Mutex<GlobalInner>,
    arbitration: Mutex<Arbitration>,
    broadcaster: Broadcaster,
}

impl RigRegistry {
    /// Create a registry publishing through the given broadcaster
    pub fn new(cfg: RegistryConfig, policy: PublishPolicy, broadcaster: Broadcaster) -> Self {
        Self {
            cfg,
            policy: RwLock::new(policy),
            ports: RwLock::new(HashMap::new()),
            global: Mutex::new(GlobalInner {
                state: PortState::new(0),
                last_broadcast: None,
            }),
            arbitration: Mutex::new(Arbitration::default()),
            broadcaster,
        }
    }

    /// Create a fresh port entry when its worker starts
    pub fn register_port(&self, index: usize) {
        self.ports
            .write()
            .unwrap()
            .insert(index, PortState::new(index));
    }

    /// Drop a port entry when its worker exits
    pub fn remove_port(&self, index: usize) {
        self.ports.write().unwrap().remove(&index);
    }

    /// Replace the publish policy (live reconfiguration)
    pub fn set_policy(&self, policy: PublishPolicy) {
        *self.policy.write().unwrap() = policy;
    }

    /// Whether updates from the given slot may feed the global state
    pub fn accepts_from(&self, index: usize) -> bool {
        self.policy.read().unwrap().allows(index)
    }

    /// Which global fields have been observed, for probe suppression
    pub fn global_known(&self) -> (bool, bool) {
        let global = self.global.lock().unwrap();
        (global.state.freq > 0, global.state.mode.is_some())
    }

    /// Protocol of the port that last fed the global state
    pub fn global_proto(&self) -> RigProto {
        self.global.lock().unwrap().state.proto
    }

    /// Whether the port has decoded a frequency yet (AI1 liveness check)
    pub fn port_has_traffic(&self, index: usize) -> bool {
        self.ports
            .read()
            .unwrap()
            .get(&index)
            .map(|st| st.freq > 0)
            .unwrap_or(false)
    }

    /// Apply one decoded observation from a port's worker.
    ///
    /// No-op updates are dropped here; anything that survives change
    /// detection and arbitration is folded into the global state and
    /// published unless identical to the previous broadcast. A suppressed
    /// update leaves the port state untouched, so the same report wins once
    /// the flap window has passed.
    pub fn apply(&self, index: usize, update: StateUpdate) {
        let (freq_candidate, mode_candidate) = {
            let mut ports = self.ports.write().unwrap();
            let st = ports.entry(index).or_insert_with(|| PortState::new(index));
            st.proto = update.proto;
            (
                update
                    .freq
                    .filter(|&hz| hz > 0 && (hz - st.freq).abs() >= self.cfg.freq_deadband_hz),
                update
                    .mode
                    .filter(|&(mode, data)| st.mode != Some(mode) || st.data != data),
            )
        };

        let freq_changed = freq_candidate.is_some();
        let mode_changed = mode_candidate.is_some();
        if !freq_changed && !mode_changed {
            return;
        }

        {
            let mut arb = self.arbitration.lock().unwrap();
            let now = Instant::now();
            if let Some((last_index, last_at)) = arb.last {
                // A frequency-only report from another port inside the window
                // is CI-V transceive chatter, not operator input.
                if last_index != index
                    && now.duration_since(last_at) < self.cfg.flap_guard
                    && !mode_changed
                {
                    debug!("rig[{index}]: frequency update suppressed by active port {last_index}");
                    return;
                }
            }
            arb.last = Some((index, now));
        }

        let port = {
            let mut ports = self.ports.write().unwrap();
            let st = ports.entry(index).or_insert_with(|| PortState::new(index));
            if let Some(hz) = freq_candidate {
                st.freq = hz;
            }
            if let Some((mode, data)) = mode_candidate {
                st.mode = Some(mode);
                st.data = data;
            }
            st.clone()
        };

        let event = {
            let mut global = self.global.lock().unwrap();
            if freq_changed {
                global.state.freq = port.freq;
            }
            if mode_changed || (freq_changed && port.mode.is_some()) {
                global.state.mode = port.mode;
                global.state.data = port.data;
            }
            global.state.proto = update.proto;
            global.state.index = index;

            let key = (
                global.state.freq,
                global.state.mode,
                global.state.data,
                global.state.proto,
            );
            if global.last_broadcast == Some(key) {
                return;
            }
            global.last_broadcast = Some(key);
            rig_event(&global.state)
        };

        self.broadcaster.publish(&event);
    }

    /// State of one port, if its worker is running
    pub fn port_state(&self, index: usize) -> Option<PortState> {
        self.ports.read().unwrap().get(&index).cloned()
    }

    /// The reconciled global state
    pub fn global_state(&self) -> PortState {
        self.global.lock().unwrap().state.clone()
    }

    /// Build the reply for a client snapshot query
    pub fn snapshot_reply(&self, port: Option<usize>) -> SnapshotReply {
        let ports = self.ports.read().unwrap();
        match port {
            Some(index) => match ports.get(&index) {
                Some(st) => SnapshotReply::RigState {
                    port: index,
                    freq: st.freq,
                    mode: st.mode.map(|m| m.as_str().to_string()).unwrap_or_default(),
                    data: st.data,
                    proto: st.proto,
                },
                None => SnapshotReply::Error {
                    error: "Port not found or not initialized".to_string(),
                },
            },
            None => SnapshotReply::RigStates {
                states: ports
                    .iter()
                    .map(|(i, st)| (i.to_string(), st.snapshot()))
                    .collect(),
            },
        }
    }
}

/// Compose the publish event for the current global state
fn rig_event(state: &PortState) -> BridgeEvent {
    let mode = state.mode.map(|m| display_mode(m, state.freq));
    BridgeEvent::Rig {
        rig: state.proto,
        freq: (state.freq > 0).then_some(state.freq),
        mode,
        data: mode.map(|_| state.data),
    }
}
