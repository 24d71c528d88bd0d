//! Error types for the watcher subsystem

use thiserror::Error;

/// Errors that can occur while bringing up or running a port watcher
#[derive(Debug, Error)]
pub enum WatchError {
    /// Serial device could not be opened
    #[error("failed to open serial port {port}: {source}")]
    SerialOpen {
        /// OS path of the device
        port: String,
        /// Underlying driver error
        source: tokio_serial::Error,
    },

    /// Pseudo-tty pairs are not available on this platform
    #[error("pseudo-tty support is not available on this platform")]
    PtyUnsupported,

    /// Pseudo-tty pair could not be opened
    #[error("failed to open pseudo-tty: {0}")]
    PtyOpen(#[source] std::io::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
