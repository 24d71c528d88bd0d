//! Serial port enumeration for the settings surface

use serialport::available_ports;
use tracing::warn;

/// Names of the serial ports present on this system
pub fn list_serial_ports() -> Vec<String> {
    match available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("serial port enumeration failed: {e}");
            Vec::new()
        }
    }
}
