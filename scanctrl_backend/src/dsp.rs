//! RS232 link to the Scan-Control DSP.
//!
//! The DSP listens at 57600 baud, 8 data bits, no parity, one stop bit and no flow control. A
//! protocol is uploaded as the exact text produced by
//! [`Protocol::render`](scancmdr_backend::protocol::Protocol::render) (a clear command followed by
//! one add command per line), then started with the execute command `X`. The DSP does not answer,
//! so nothing is read back.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use scancmdr_backend::ScanError;

use crate::error::{LinkError, LinkResult};

pub const DEFAULT_BAUD_RATE: u32 = 57600;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;
const EXECUTE: &[u8] = b"X\n";

/// Destination of finished protocols.
pub trait ProtocolSink {
    /// Uploads `protocol` and starts it.
    fn transmit(&mut self, protocol: &str) -> LinkResult<()>;
}

/// Serial settings, read from the `[serial]` table of the rig configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LinkSettings {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Deserialize)]
struct RigFile {
    serial: LinkSettings,
}

impl LinkSettings {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_toml_str(text: &str) -> LinkResult<Self> {
        let rig: RigFile = toml::from_str(text).map_err(ScanError::from)?;
        Ok(rig.serial)
    }

    /// Reads the `[serial]` table of a rig configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> LinkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScanError::Resource {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Writes protocols and execute commands to the DSP over any byte sink.
pub struct DspLink<W: Write> {
    port: W,
}

impl<W: Write> DspLink<W> {
    pub fn new(port: W) -> Self {
        Self { port }
    }

    pub fn get_ref(&self) -> &W {
        &self.port
    }

    pub fn into_inner(self) -> W {
        self.port
    }

    /// Sends a rendered protocol verbatim. The text must start with the clear command.
    pub fn upload(&mut self, protocol: &str) -> LinkResult<()> {
        if !protocol.starts_with("C\n") {
            return Err(ScanError::InvalidParameter(
                "protocol text must start with the clear command".to_string(),
            )
            .into());
        }
        self.port.write_all(protocol.as_bytes())?;
        self.port.flush()?;
        info!(
            "Uploaded protocol: {} lines, {} bytes",
            protocol.lines().count(),
            protocol.len()
        );
        Ok(())
    }

    /// Starts the uploaded protocol.
    pub fn execute(&mut self) -> LinkResult<()> {
        self.port.write_all(EXECUTE)?;
        self.port.flush()?;
        info!("Sent execute");
        Ok(())
    }
}

impl<W: Write> ProtocolSink for DspLink<W> {
    fn transmit(&mut self, protocol: &str) -> LinkResult<()> {
        self.upload(protocol)?;
        self.execute()
    }
}

/// Opens the serial port described by `settings` with the DSP's framing (8N1, no flow control).
pub fn open_serial(settings: &LinkSettings) -> LinkResult<DspLink<Box<dyn SerialPort>>> {
    let port = serialport::new(&settings.port, settings.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(Duration::from_millis(settings.timeout_ms))
        .open()?;
    debug!(
        "Serial port '{}' opened at {} baud",
        settings.port, settings.baud_rate
    );
    Ok(DspLink::new(port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_writes_protocol_then_execute() {
        let mut link = DspLink::new(Vec::new());
        link.transmit("C\nAV,10,4,5000\n").unwrap();
        assert_eq!(link.into_inner(), b"C\nAV,10,4,5000\nX\n".to_vec());
    }

    #[test]
    fn upload_rejects_text_without_clear() {
        let mut link = DspLink::new(Vec::new());
        assert!(matches!(
            link.upload("AV,10,4,5000\n"),
            Err(LinkError::Scan(ScanError::InvalidParameter(_)))
        ));
        assert!(link.get_ref().is_empty());
    }

    #[test]
    fn settings_defaults() {
        let settings = LinkSettings::from_toml_str(
            "[transform]\nscale_factor = 2\ncenter_offset = [0, 0]\n\n[serial]\nport = \"/dev/ttyUSB0\"\n",
        )
        .unwrap();
        assert_eq!(settings, LinkSettings::new("/dev/ttyUSB0"));
        assert_eq!(settings.baud_rate, 57600);

        let settings =
            LinkSettings::from_toml_str("[serial]\nport = \"COM3\"\nbaud_rate = 9600\ntimeout_ms = 50\n")
                .unwrap();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.timeout_ms, 50);

        assert!(matches!(
            LinkSettings::from_toml_str("[transform]\n"),
            Err(LinkError::Scan(ScanError::Config(_)))
        ));
    }

    #[test]
    fn missing_port_fails_to_open() {
        let settings = LinkSettings::new("/nonexistent/scan-control-dsp");
        assert!(open_serial(&settings).is_err());
    }
}
