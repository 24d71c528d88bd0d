//! Pseudo-tty mirroring (POSIX)
//!
//! When PTY mode is on, each watched serial port gets a pseudo-tty pair whose
//! slave path is handed to external logging applications (WSJT-X, JTDX,
//! HAMLOG); they talk to the rig through it while the worker observes the
//! same stream.
//!
//! The pty master is a plain blocking fd, so each direction runs on its own
//! OS thread bridged to the worker with channels:
//!
//! - app → rig: the reader thread forwards bytes verbatim into a channel the
//!   worker drains onto the serial port (commands are never parsed),
//! - rig → app: the worker copies every serial chunk into a bounded channel;
//!   the writer thread drains it into the master. A full channel drops the
//!   chunk so the serial reader never blocks on a stalled app.
//!
//! Windows has no pseudo-tty pairs (and named pipes do not satisfy the
//! serial-device expectations of the common logging apps), so non-unix
//! builds report unsupported and the supervisor falls back to direct mode.

use tokio::sync::mpsc;

/// Capacity of the rig-to-app channel; chunks beyond it are dropped
pub const PTY_CHANNEL_CAPACITY: usize = 100;

/// Worker-side endpoints of one pty pair
pub struct PtyLink {
    /// Rig-to-app chunks; submitted with `try_send`, dropped when full
    pub to_app: mpsc::Sender<Vec<u8>>,
    /// App-to-rig chunks to forward onto the serial port
    pub from_app: mpsc::Receiver<Vec<u8>>,
}

/// Whether this platform can mirror ports through pseudo-ttys
pub fn supported() -> bool {
    cfg!(unix)
}

#[cfg(unix)]
pub use imp::open_router;

#[cfg(unix)]
mod imp {
    use std::fs::File;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;

    use nix::pty::{openpty, OpenptyResult};
    use tokio::sync::mpsc;
    use tracing::{debug, warn};

    use super::{PtyLink, PTY_CHANNEL_CAPACITY};
    use crate::error::WatchError;

    const FORWARD_BUF_LEN: usize = 256;

    /// Open a pty pair for the given slot and start its forwarding threads.
    ///
    /// Returns the slave device path to advertise to external applications
    /// together with the worker-side channel endpoints. The threads exit when
    /// the worker drops its endpoints or the pty fails.
    pub fn open_router(index: usize) -> Result<(String, PtyLink), WatchError> {
        let OpenptyResult { master, slave } = openpty(None, None)
            .map_err(|e| WatchError::PtyOpen(std::io::Error::from_raw_os_error(e as i32)))?;

        // SAFETY: master comes from a successful openpty and outlives the call.
        let name_ptr = unsafe { libc::ptsname(master.as_raw_fd()) };
        if name_ptr.is_null() {
            return Err(WatchError::PtyOpen(std::io::Error::last_os_error()));
        }
        // SAFETY: checked for null above.
        let slave_path = unsafe { std::ffi::CStr::from_ptr(name_ptr) }
            .to_string_lossy()
            .into_owned();

        let master = File::from(master);
        let reader = master.try_clone().map_err(WatchError::PtyOpen)?;

        let (to_app_tx, mut to_app_rx) = mpsc::channel::<Vec<u8>>(PTY_CHANNEL_CAPACITY);
        let (from_app_tx, from_app_rx) = mpsc::channel::<Vec<u8>>(PTY_CHANNEL_CAPACITY);

        let _ = std::thread::Builder::new()
            .name(format!("pty-read-{index}"))
            .spawn(move || {
                let mut master = reader;
                let mut buf = [0u8; FORWARD_BUF_LEN];
                loop {
                    match master.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if from_app_tx.blocking_send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("pty[{index}]: read error: {e}");
                            break;
                        }
                    }
                }
                debug!("pty[{index}]: reader stopped");
            })
            .map_err(WatchError::PtyOpen)?;

        let _ = std::thread::Builder::new()
            .name(format!("pty-write-{index}"))
            .spawn(move || {
                // Holding the slave fd open keeps the master readable while
                // no external application is attached.
                let _slave = slave;
                let mut master = master;
                while let Some(chunk) = to_app_rx.blocking_recv() {
                    if let Err(e) = master.write_all(&chunk) {
                        warn!("pty[{index}]: write error: {e}");
                        break;
                    }
                }
                debug!("pty[{index}]: writer stopped");
            })
            .map_err(WatchError::PtyOpen)?;

        Ok((
            slave_path,
            PtyLink {
                to_app: to_app_tx,
                from_app: from_app_rx,
            },
        ))
    }
}

/// Stub for platforms without pseudo-tty pairs
#[cfg(not(unix))]
pub fn open_router(_index: usize) -> Result<(String, PtyLink), crate::error::WatchError> {
    Err(crate::error::WatchError::PtyUnsupported)
}
