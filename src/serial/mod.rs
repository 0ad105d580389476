pub(crate) mod client;
pub(crate) mod frame;
pub(crate) mod server;

pub use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

/// Serial port settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate of the serial port
    pub baud_rate: u32,
    /// Number of bits per character
    pub data_bits: DataBits,
    /// Types of flow control
    pub flow_control: FlowControl,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Parity checking mode
    pub parity: Parity,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

pub(crate) fn open(
    path: &str,
    settings: SerialSettings,
) -> Result<tokio_serial::SerialStream, std::io::Error> {
    let builder = tokio_serial::new(path, settings.baud_rate)
        .data_bits(settings.data_bits)
        .flow_control(settings.flow_control)
        .stop_bits(settings.stop_bits)
        .parity(settings.parity);

    tokio_serial::SerialStream::open(&builder)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
}
