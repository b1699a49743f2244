// src/instruments/p4603.rs
// OWON P4603 bench power supply.
use std::thread;
use std::time::Duration;
use log::debug;
use crate::error::LabError;
use crate::instruments::verify_identity;
use crate::port::{parse_number, InstrumentPort};
const SETTLE_POLLS: usize = 50;
const SETTLE_TOLERANCE: f64 = 0.01;
pub struct P4603<P> {
    port: P,
    poll_interval: Duration,
}
impl<P: InstrumentPort> P4603<P> {
    pub fn connect(mut port: P) -> Result<Self, LabError> {
        verify_identity(&mut port, "P4603")?;
        Ok(Self {
            port,
            poll_interval: Duration::from_millis(100),
        })
    }
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
    pub fn port(&self) -> &P {
        &self.port
    }
    fn query_number(&mut self, command: &str) -> Result<f64, LabError> {
        let response = self.port.query(command)?;
        parse_number(&self.port, &response)
    }
    pub fn set_current(&mut self, amps: f64) -> Result<(), LabError> {
        self.port.write(&format!("CURR {amps:.3}"))
    }
    /// Set the output voltage. With `wait` and the output on, block until the
    /// measured voltage is within 10 mV of the target.
    pub fn set_voltage(&mut self, volts: f64, wait: bool) -> Result<(), LabError> {
        self.port.write(&format!("VOLT {volts:.3}"))?;
        if !wait || !self.is_on()? {
            return Ok(());
        }
        let mut measured = f64::NAN;
        for attempt in 0..SETTLE_POLLS {
            measured = self.measure_voltage()?;
            if (measured - volts).abs() < SETTLE_TOLERANCE {
                debug!("{}: {volts} V reached after {attempt} polls", self.port.name());
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
        Err(LabError::VoltageNotReached {
            measured,
            target: volts,
        })
    }
    pub fn is_on(&mut self) -> Result<bool, LabError> {
        Ok(self.query_number("OUTP?")? != 0.0)
    }
    pub fn output_on(&mut self) -> Result<(), LabError> {
        self.port.write("OUTP 1")?;
        self.port.query("OUTP?").map(|_| ())
    }
    pub fn output_off(&mut self) -> Result<(), LabError> {
        self.port.write("OUTP 0")?;
        self.port.query("OUTP?").map(|_| ())
    }
    pub fn measure_voltage(&mut self) -> Result<f64, LabError> {
        self.query_number("MEAS:VOLT?")
    }
    pub fn measure_current(&mut self) -> Result<f64, LabError> {
        self.query_number("MEAS:CURR?")
    }
}
