// src/instruments/xdm2041.rs
// OWON XDM2041 multimeter.
use crate::error::LabError;
use crate::instruments::verify_identity;
use crate::port::{parse_number, InstrumentPort};
pub const VOLTAGE_RANGES: [f64; 6] = [0.05, 0.5, 5.0, 50.0, 500.0, 1000.0];
pub const RESISTANCE_RANGES: [f64; 6] = [500.0, 5e3, 50e3, 500e3, 5e6, 50e6];
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rate {
    Fast,
    Slow,
}
/// Smallest range that still covers `max`.
fn covering_range(ranges: &[f64], max: f64) -> Result<f64, LabError> {
    ranges
        .iter()
        .copied()
        .find(|&r| r >= max)
        .ok_or_else(|| LabError::InvalidParameter(format!("{max} exceeds the largest range")))
}
pub struct Xdm2041<P> {
    port: P,
}
impl<P: InstrumentPort> Xdm2041<P> {
    pub fn connect(mut port: P) -> Result<Self, LabError> {
        verify_identity(&mut port, "XDM2041")?;
        Ok(Self { port })
    }
    pub fn port(&self) -> &P {
        &self.port
    }
    pub fn set_rate(&mut self, rate: Rate) -> Result<(), LabError> {
        match rate {
            Rate::Fast => self.port.write("RATE F"),
            Rate::Slow => self.port.write("RATE L"),
        }
    }
    /// DC volts, on the smallest range covering `max_volts`.
    pub fn set_voltage_range(&mut self, max_volts: f64) -> Result<(), LabError> {
        let range = covering_range(&VOLTAGE_RANGES, max_volts)?;
        self.port.write(&format!("CONF:VOLT:DC {range:.3}"))
    }
    pub fn set_resistance_range(&mut self, max_ohms: f64) -> Result<(), LabError> {
        let range = covering_range(&RESISTANCE_RANGES, max_ohms)?;
        self.port.write(&format!("CONF:RES {range:.3}"))
    }
    /// Reading of the primary display in the configured function.
    pub fn measure(&mut self) -> Result<f64, LabError> {
        let response = self.port.query("MEAS1?")?;
        parse_number(&self.port, &response)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ScriptedPort;
    #[test]
    fn ranges_cover_the_requested_maximum() {
        let port = ScriptedPort::scripted("dmm")
            .reply("OWON,XDM2041,2148123,V3.4.1,3")
            .reply("1.2345E+00");
        let mut dmm = Xdm2041::connect(port).unwrap();
        dmm.set_rate(Rate::Slow).unwrap();
        dmm.set_voltage_range(3.3).unwrap();
        dmm.set_voltage_range(5.0).unwrap();
        dmm.set_resistance_range(10e3).unwrap();
        assert!(dmm.set_voltage_range(1500.0).is_err());
        assert_eq!(dmm.measure().unwrap(), 1.2345);
        assert_eq!(
            dmm.port().sent()[1..],
            [
                "RATE L",
                "CONF:VOLT:DC 5.000",
                "CONF:VOLT:DC 5.000",
                "CONF:RES 50000.000",
                "MEAS1?"
            ]
        );
    }
}
