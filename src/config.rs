// src/config.rs
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::LabError;
use crate::port::StreamPort;
use crate::response::MeasurementSettings;
/// Where an instrument lives and how to talk to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentAddress {
    Tcp { address: String },
    Serial { path: String, baud_rate: u32 },
}
impl InstrumentAddress {
    pub fn serial(path: &str, baud_rate: u32) -> Self {
        InstrumentAddress::Serial {
            path: path.to_string(),
            baud_rate,
        }
    }
    pub fn tcp(address: &str) -> Self {
        InstrumentAddress::Tcp {
            address: address.to_string(),
        }
    }
    /// Open the transport. The returned port is boxed so serial and TCP
    /// instruments share one handle type.
    pub fn open(&self, timeout: Duration) -> Result<BoxedPort, LabError> {
        match self {
            InstrumentAddress::Tcp { address } => {
                let port = StreamPort::tcp(address, timeout)?;
                let name = address.clone();
                let stream: Box<dyn ReadWrite> = Box::new(port.into_stream());
                Ok(StreamPort::new(name, stream))
            }
            InstrumentAddress::Serial { path, baud_rate } => {
                let port = StreamPort::serial(path, *baud_rate, timeout)?;
                let stream: Box<dyn ReadWrite> = Box::new(port.into_stream());
                Ok(StreamPort::new(path.clone(), stream))
            }
        }
    }
}
/// Object-safe union of `Read` and `Write`.
pub trait ReadWrite: std::io::Read + std::io::Write + Send {}
impl<T: std::io::Read + std::io::Write + Send> ReadWrite for T {}
pub type BoxedPort = StreamPort<Box<dyn ReadWrite>>;
/// Bench wiring plus measurement defaults.
///
/// Every field has a default matching the bench this tool was written for, so
/// a config file only needs to list what differs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub scope: InstrumentAddress,
    pub generator: InstrumentAddress,
    pub psu: InstrumentAddress,
    pub load: InstrumentAddress,
    pub dmm: InstrumentAddress,
    pub relay_mux: InstrumentAddress,
    pub tinysa: InstrumentAddress,
    /// Per-command timeout for the scope, which has large waveform transfers.
    pub scope_timeout_ms: u64,
    /// Per-command timeout for everything else.
    pub serial_timeout_ms: u64,
    pub measurement: MeasurementSettings,
}
impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            scope: InstrumentAddress::tcp("scope:5555"),
            generator: InstrumentAddress::serial("/dev/instruments/JDS6600", 115_200),
            psu: InstrumentAddress::serial("/dev/instruments/P4603", 115_200),
            load: InstrumentAddress::serial("/dev/instruments/ET5410", 9_600),
            dmm: InstrumentAddress::serial("/dev/instruments/XDM2041", 115_200),
            relay_mux: InstrumentAddress::serial("/dev/instruments/relaymux", 115_200),
            tinysa: InstrumentAddress::serial("/dev/instruments/tinysa", 115_200),
            scope_timeout_ms: 10_000,
            serial_timeout_ms: 2_000,
            measurement: MeasurementSettings::default(),
        }
    }
}
impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, LabError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LabError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
    pub fn from_json(text: &str) -> Result<Self, LabError> {
        Ok(serde_json::from_str(text)?)
    }
    pub fn scope_timeout(&self) -> Duration {
        Duration::from_millis(self.scope_timeout_ms)
    }
    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }
}
