use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::info;

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Serial radio transport (8N1, no flow control).
pub struct SerialEndpoint;

impl SerialEndpoint {
    /// Default baud rate of the telemetry radios.
    pub const DEFAULT_BAUD: u32 = 57_600;

    /// Open a serial port.
    ///
    /// `timeout` bounds each blocking read so the reader loop can observe
    /// shutdown; buffered bytes left over from a previous session are dropped.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<LinkStream> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|err| TransportError::SerialOpen {
                path: path.to_string(),
                message: err.to_string(),
            })?;

        port.clear(serialport::ClearBuffer::All)
            .map_err(|err| TransportError::SerialOpen {
                path: path.to_string(),
                message: err.to_string(),
            })?;

        info!(path, baud_rate, "opened serial port");
        Ok(LinkStream::from_serial(port))
    }
}
