// src/instruments/et5410.rs
// East Tester ET5410A+ electronic load.
use log::warn;
use crate::error::LabError;
use crate::instruments::verify_identity;
use crate::port::{parse_number, InstrumentPort};
pub struct Et5410<P> {
    port: P,
}
impl<P: InstrumentPort> Et5410<P> {
    /// The load often answers the first `*IDN?` after power-up with garbage,
    /// so identification is tried twice.
    pub fn connect(mut port: P) -> Result<Self, LabError> {
        if let Err(err) = verify_identity(&mut port, "V1.0") {
            warn!("{}: {err}, retrying", port.name());
            verify_identity(&mut port, "V1.0")?;
        }
        Ok(Self { port })
    }
    pub fn port(&self) -> &P {
        &self.port
    }
    /// Readings carry a trailing `R`.
    fn query_reading(&mut self, command: &str) -> Result<f64, LabError> {
        let response = self.port.query(command)?;
        parse_number(&self.port, response.trim_end_matches('R'))
    }
    /// Constant current mode.
    pub fn set_cc(&mut self, amps: f64) -> Result<(), LabError> {
        self.port.write("CH:MODE CC")?;
        self.port.write(&format!("CURR:CC {amps:.3}"))
    }
    /// Constant current with a voltage limit.
    pub fn set_cccv(&mut self, amps: f64, volts: f64) -> Result<(), LabError> {
        self.port.write("CH:MODE CCCV")?;
        self.port.write(&format!("CURR:CCCV {amps:.3}"))?;
        self.port.write(&format!("VOLT:CCCV {volts:.3}"))
    }
    pub fn is_on(&mut self) -> Result<bool, LabError> {
        Ok(self.port.query("CH:SW?")?.contains("ON"))
    }
    pub fn output_on(&mut self) -> Result<(), LabError> {
        self.port.write("CH:SW ON")
    }
    pub fn output_off(&mut self) -> Result<(), LabError> {
        self.port.write("CH:SW OFF")
    }
    pub fn measure_voltage(&mut self) -> Result<f64, LabError> {
        self.query_reading("MEAS:VOLT?")
    }
    pub fn measure_current(&mut self) -> Result<f64, LabError> {
        self.query_reading("MEAS:CURR?")
    }
}
