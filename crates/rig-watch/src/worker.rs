//! Per-port serial watcher
//!
//! One worker owns each configured serial port: it classifies the byte
//! stream as CI-V or CAT, extracts frames, and feeds decoded observations to
//! the registry. Everything a port needs to schedule lives in a single phase
//! machine driven off one deadline:
//!
//! ```text
//! Detecting --(FE FE seen)--------> Civ
//!     |  \--(FA/MD seen)----------> CatArmed --(traffic)--> CatSettled
//!     \--(1 s silent: assume CAT)-> CatArmed --(2 s silent)-> CatPolling
//! ```
//!
//! While detecting, the worker probes with CI-V broadcast queries after
//! 300 ms; a rig that answers neither dialect after 1 s is assumed to be a
//! CAT rig with Auto-Information off. CAT activation writes `AI1;FA;MD0;`,
//! and if the port stays silent for another 2 s the worker drops to polling
//! `FA;MD0;` every 2 s, which is what the AI-less legacy rigs (FT-817/857/
//! 897, TS-2000) need.
//!
//! Workers are generic over the I/O stream so tests can drive them with
//! `tokio::io::duplex` instead of a serial device.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rig_protocol::{cat, civ, detect_proto, RigProto, StreamCodec};
use rig_protocol::cat::CatCodec;
use rig_protocol::civ::CivCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, info, warn};

use crate::error::WatchError;
use crate::pty::PtyLink;
use crate::registry::{RigRegistry, StateUpdate};

/// Serial read buffer size
const READ_BUF_LEN: usize = 256;
/// Detection buffer cap while the protocol is undecided
const DETECT_BUF_CAP: usize = 64;
/// Bytes kept when the detection buffer overflows
const DETECT_BUF_KEEP: usize = 32;

/// Delay before the CI-V broadcast queries go out
const PROBE_DELAY: Duration = Duration::from_millis(300);
/// Silence after which an undetected port is assumed to be CAT
const DETECT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Grace period for AI1 to produce traffic before polling starts
const AI_GRACE: Duration = Duration::from_secs(2);
/// Poll cadence for rigs that ignore AI1
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Commands the supervisor can send a running worker
#[derive(Debug)]
pub enum WorkerCommand {
    /// Re-enable CAT Auto-Information after an external app disabled it
    RearmAutoInfo,
    /// Stop the worker
    Shutdown,
}

/// Scheduling phase of one port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkPhase {
    /// Accumulating bytes until the dialect is known
    Detecting {
        /// Whether the CI-V queries have gone out
        probed: bool,
    },
    /// CI-V confirmed; the rig drives itself via transceive
    Civ,
    /// CAT active, waiting to see whether AI1 took
    CatArmed,
    /// AI1 produced traffic; nothing left to schedule
    CatSettled,
    /// Legacy rig: poll on a fixed cadence
    CatPolling,
}

/// Watcher for a single serial port
pub struct PortWorker<T> {
    index: usize,
    io: T,
    registry: Arc<RigRegistry>,
    pty: Option<PtyLink>,
    proto: RigProto,
    phase: LinkPhase,
    deadline: Option<Instant>,
    detect_buf: Vec<u8>,
    civ_codec: CivCodec,
    cat_codec: CatCodec,
}

impl PortWorker<SerialStream> {
    /// Open the serial device at 8-N-1 and build its worker
    pub fn connect(
        index: usize,
        port: &str,
        baud: u32,
        registry: Arc<RigRegistry>,
        pty: Option<PtyLink>,
    ) -> Result<Self, WatchError> {
        let stream = tokio_serial::new(port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|source| WatchError::SerialOpen {
                port: port.to_string(),
                source,
            })?;
        Ok(Self::new(index, stream, registry, pty))
    }
}

impl<T> PortWorker<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Build a worker over an already-open stream
    pub fn new(index: usize, io: T, registry: Arc<RigRegistry>, pty: Option<PtyLink>) -> Self {
        Self {
            index,
            io,
            registry,
            pty,
            proto: RigProto::Unknown,
            phase: LinkPhase::Detecting { probed: false },
            deadline: None,
            detect_buf: Vec::new(),
            civ_codec: CivCodec::new(),
            cat_codec: CatCodec::new(),
        }
    }

    /// Run until the stream fails, closes, or a shutdown arrives
    pub async fn run(mut self, mut commands: mpsc::Receiver<WorkerCommand>) {
        let (pty_tx, mut pty_rx) = match self.pty.take() {
            Some(link) => (Some(link.to_app), Some(link.from_app)),
            None => (None, None),
        };

        self.registry.register_port(self.index);
        info!("rig[{}]: watcher started", self.index);

        let opened_at = Instant::now();
        self.deadline = Some(opened_at + PROBE_DELAY);
        let mut buf = [0u8; READ_BUF_LEN];

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(WorkerCommand::RearmAutoInfo) => {
                        if self.rearm_auto_info().await.is_err() {
                            break;
                        }
                    }
                    Some(WorkerCommand::Shutdown) | None => {
                        debug!("rig[{}]: shutdown requested", self.index);
                        break;
                    }
                },

                result = self.io.read(&mut buf) => match result {
                    Ok(0) => {
                        debug!("rig[{}]: stream closed", self.index);
                        break;
                    }
                    Ok(n) => {
                        let data = &buf[..n];
                        if let Some(tx) = &pty_tx {
                            // Pass-through copy for the external app; never
                            // stall the serial reader on a slow consumer.
                            if tx.try_send(data.to_vec()).is_err() {
                                debug!("rig[{}]: pty channel full, {} bytes dropped", self.index, n);
                            }
                        }
                        if self.ingest(data).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("rig[{}]: read error: {e}", self.index);
                        break;
                    }
                },

                chunk = recv_from(&mut pty_rx) => match chunk {
                    Some(data) => {
                        // App-to-rig commands are forwarded verbatim, never parsed.
                        if let Err(e) = self.io.write_all(&data).await {
                            warn!("rig[{}]: write error: {e}", self.index);
                            break;
                        }
                    }
                    None => pty_rx = None,
                },

                _ = sleep_until(self.deadline.unwrap_or_else(Instant::now)), if self.deadline.is_some() => {
                    if self.on_deadline(opened_at).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.registry.remove_port(self.index);
        info!("rig[{}]: watcher stopped", self.index);
    }

    /// Advance the phase machine when its deadline fires
    async fn on_deadline(&mut self, opened_at: Instant) -> io::Result<()> {
        match self.phase {
            LinkPhase::Detecting { probed: false } => {
                self.phase = LinkPhase::Detecting { probed: true };
                self.deadline = Some(opened_at + DETECT_TIMEOUT);
                self.send_civ_probe().await?;
            }
            LinkPhase::Detecting { probed: true } => {
                info!("rig[{}]: nothing detected, assuming CAT", self.index);
                self.proto = RigProto::Cat;
                let pending = std::mem::take(&mut self.detect_buf);
                self.arm_cat().await?;
                self.decode(&pending);
            }
            LinkPhase::CatArmed => {
                if self.registry.port_has_traffic(self.index) {
                    self.phase = LinkPhase::CatSettled;
                    self.deadline = None;
                } else {
                    info!(
                        "rig[{}]: AI1 unanswered, polling for legacy rig",
                        self.index
                    );
                    self.phase = LinkPhase::CatPolling;
                    self.deadline = Some(Instant::now() + POLL_INTERVAL);
                    self.write_all(cat::POLL_QUERY).await?;
                }
            }
            LinkPhase::CatPolling => {
                self.deadline = Some(Instant::now() + POLL_INTERVAL);
                self.write_all(cat::POLL_QUERY).await?;
            }
            LinkPhase::Civ | LinkPhase::CatSettled => {
                self.deadline = None;
            }
        }
        Ok(())
    }

    /// CI-V broadcast queries, each skipped once its field is known
    async fn send_civ_probe(&mut self) -> io::Result<()> {
        let (freq_known, mode_known) = self.registry.global_known();
        if !freq_known {
            self.write_all(&civ::FREQ_QUERY).await?;
        }
        if !mode_known {
            self.write_all(&civ::MODE_QUERY).await?;
        }
        debug!("rig[{}]: CI-V initial queries sent", self.index);
        Ok(())
    }

    /// Enable CAT Auto-Information and request the initial state
    async fn arm_cat(&mut self) -> io::Result<()> {
        self.phase = LinkPhase::CatArmed;
        self.deadline = Some(Instant::now() + AI_GRACE);
        self.write_all(cat::AUTO_INFO_ARM).await?;
        info!("rig[{}]: CAT auto-information armed", self.index);
        Ok(())
    }

    /// Resend AI1 after an external app turned it off
    async fn rearm_auto_info(&mut self) -> io::Result<()> {
        if self.proto == RigProto::Cat {
            self.write_all(cat::AUTO_INFO_ARM).await?;
            info!("rig[{}]: AI1 re-sent (settings changed)", self.index);
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.io.write_all(data).await?;
        self.io.flush().await
    }

    /// Feed a chunk through detection or straight into the active codec
    async fn ingest(&mut self, data: &[u8]) -> io::Result<()> {
        if self.proto.is_known() {
            self.decode(data);
            return Ok(());
        }

        self.detect_buf.extend_from_slice(data);
        let detected = detect_proto(&self.detect_buf);
        if !detected.is_known() {
            if self.detect_buf.len() > DETECT_BUF_CAP {
                let cut = self.detect_buf.len() - DETECT_BUF_KEEP;
                self.detect_buf.drain(..cut);
            }
            return Ok(());
        }

        info!("rig[{}]: detected protocol {}", self.index, detected.label());
        self.proto = detected;
        let pending = std::mem::take(&mut self.detect_buf);
        match detected {
            RigProto::Civ => {
                self.phase = LinkPhase::Civ;
                self.deadline = None;
            }
            RigProto::Cat => self.arm_cat().await?,
            RigProto::Unknown => unreachable!(),
        }
        self.decode(&pending);
        Ok(())
    }

    /// Run buffered bytes through the active codec and push decoded updates
    fn decode(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        match self.proto {
            RigProto::Civ => {
                self.civ_codec.push_bytes(data);
                while let Some(frame) = self.civ_codec.next_frame() {
                    if frame.is_frequency() {
                        match civ::decode_frequency(&frame.payload) {
                            Ok(hz) if hz > 0 => {
                                self.push_update(StateUpdate::frequency(RigProto::Civ, hz))
                            }
                            Ok(_) => {}
                            Err(e) => debug!("rig[{}]: bad CI-V frequency: {e}", self.index),
                        }
                    } else if frame.is_mode() {
                        match civ::decode_mode(&frame.payload) {
                            Ok((mode, data)) => {
                                self.push_update(StateUpdate::mode(RigProto::Civ, mode, data))
                            }
                            Err(e) => debug!("rig[{}]: bad CI-V mode: {e}", self.index),
                        }
                    }
                }
            }
            RigProto::Cat => {
                self.cat_codec.push_bytes(data);
                while let Some(cmd) = self.cat_codec.next_frame() {
                    self.handle_cat_command(&cmd);
                }
            }
            RigProto::Unknown => {}
        }
    }

    fn handle_cat_command(&mut self, cmd: &str) {
        if cmd.len() < 2 {
            return;
        }
        if cmd.starts_with("IF") {
            match cat::parse_if(cmd) {
                Ok(report) => self.push_update(StateUpdate::status(
                    RigProto::Cat,
                    Some(report.freq),
                    report.mode,
                )),
                Err(e) => debug!("rig[{}]: bad IF report: {e}", self.index),
            }
        } else if cmd.starts_with("FA") {
            match cat::parse_frequency(cmd) {
                Ok(hz) if hz > 0 => self.push_update(StateUpdate::frequency(RigProto::Cat, hz)),
                Ok(_) => {}
                Err(e) => debug!("rig[{}]: bad FA report: {e}", self.index),
            }
        } else if cmd.starts_with("MD") {
            match cat::parse_mode(cmd) {
                Ok((mode, data)) => {
                    self.push_update(StateUpdate::mode(RigProto::Cat, mode, data))
                }
                Err(e) => debug!("rig[{}]: bad MD report: {e}", self.index),
            }
        }
    }

    fn push_update(&self, update: StateUpdate) {
        // In single-port broadcast mode the other ports are parsed but their
        // observations stop here.
        if !self.registry.accepts_from(self.index) {
            return;
        }
        self.registry.apply(self.index, update);
    }
}

/// Await the pty app-to-rig channel when present
async fn recv_from(rx: &mut Option<mpsc::Receiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
