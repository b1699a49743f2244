// src/instruments/jds6600.rs
// JDS6600 two-channel DDS function generator.
//
// Commands are `:wNN=<args>.` (write) and `:rNN=<args>.` (read), each
// answered with one line.
use log::{debug, info};
use crate::error::LabError;
use crate::instruments::SignalGenerator;
use crate::port::InstrumentPort;
const MAX_FREQUENCY_HZ: f64 = 60.0e6;
const MAX_AMPLITUDE_MV: u32 = 20_000;
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine = 0,
    Square = 1,
    Pulse = 2,
    Triangle = 3,
    PartialSine = 4,
    Cmos = 5,
    DcLevel = 6,
    HalfWave = 7,
    FullWave = 8,
    PositiveLadder = 9,
    NegativeLadder = 10,
    Noise = 11,
    ExponentialRise = 12,
    ExponentialDecay = 13,
    MultiTone = 14,
    Sinc = 15,
    Lorenz = 16,
}
pub struct Jds6600<P> {
    port: P,
    model: String,
}
impl<P: InstrumentPort> Jds6600<P> {
    pub fn connect(mut port: P) -> Result<Self, LabError> {
        let response = port.query(":r00=0.")?;
        let model = response
            .strip_prefix(":r00=")
            .map(|rest| rest.trim_end_matches('.').to_string())
            .filter(|model| !model.is_empty() && model.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| LabError::UnexpectedIdentity {
                expected: ":r00=<model>.".to_string(),
                response: response.clone(),
            })?;
        info!("{}: connected to JDS6600 model {model}", port.name());
        Ok(Self { port, model })
    }
    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn port(&self) -> &P {
        &self.port
    }
    fn channel_register(channel: u8, first: u8) -> Result<u8, LabError> {
        match channel {
            1 => Ok(first),
            2 => Ok(first + 1),
            _ => Err(LabError::InvalidParameter(format!(
                "JDS6600 has channels 1 and 2, not {channel}"
            ))),
        }
    }
    /// Send a write command and check the `:ok` acknowledgement.
    fn command(&mut self, register: u8, args: &str) -> Result<(), LabError> {
        let command = format!(":w{register:02}={args}.");
        let reply = self.port.query(&command)?;
        if reply.contains("ok") {
            Ok(())
        } else {
            Err(LabError::protocol(
                self.port.name(),
                format!("{command} answered with {reply:?}"),
            ))
        }
    }
    /// Frequency in Hz, sent with 0.01 Hz resolution.
    pub fn set_frequency(&mut self, channel: u8, hz: f64) -> Result<(), LabError> {
        if !(0.0..=MAX_FREQUENCY_HZ).contains(&hz) {
            return Err(LabError::InvalidParameter(format!(
                "frequency {hz} Hz out of range"
            )));
        }
        let register = Self::channel_register(channel, 23)?;
        let centihertz = (hz * 100.0).round() as u64;
        debug!("{}: CH{channel} {hz} Hz", self.port.name());
        self.command(register, &format!("{centihertz},0"))
    }
    /// Peak-to-peak amplitude in millivolts.
    pub fn set_amplitude(&mut self, channel: u8, millivolts: u32) -> Result<(), LabError> {
        if millivolts > MAX_AMPLITUDE_MV {
            return Err(LabError::InvalidParameter(format!(
                "amplitude {millivolts} mV out of range"
            )));
        }
        let register = Self::channel_register(channel, 25)?;
        self.command(register, &millivolts.to_string())
    }
    pub fn set_waveform(&mut self, channel: u8, waveform: Waveform) -> Result<(), LabError> {
        let register = Self::channel_register(channel, 21)?;
        self.command(register, &(waveform as u8).to_string())
    }
    pub fn set_outputs(&mut self, ch1: bool, ch2: bool) -> Result<(), LabError> {
        self.command(20, &format!("{},{}", u8::from(ch1), u8::from(ch2)))
    }
}
impl<P: InstrumentPort> SignalGenerator for Jds6600<P> {
    fn set_frequency(&mut self, channel: u8, hz: f64) -> Result<(), LabError> {
        Jds6600::set_frequency(self, channel, hz)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ScriptedPort;
    fn generator(acks: usize) -> Jds6600<ScriptedPort> {
        let mut port = ScriptedPort::scripted("awg")
            .with_write_termination("\r\n")
            .reply(":r00=6015.");
        for _ in 0..acks {
            port = port.reply(":ok");
        }
        Jds6600::connect(port).unwrap()
    }
    #[test]
    fn identity_reports_model() {
        let awg = generator(0);
        assert_eq!(awg.model(), "6015");
        assert_eq!(awg.port().sent(), [":r00=0."]);
        let port = ScriptedPort::scripted("awg").reply("*IDN RIGOL");
        assert!(matches!(
            Jds6600::connect(port),
            Err(LabError::UnexpectedIdentity { .. })
        ));
    }
    #[test]
    fn frequency_in_centihertz() {
        let mut awg = generator(3);
        awg.set_frequency(1, 1_000.0).unwrap();
        awg.set_frequency(2, 12.34).unwrap();
        SignalGenerator::set_frequency(&mut awg, 1, 100_000.0).unwrap();
        assert!(awg.set_frequency(3, 1.0).is_err());
        assert!(awg.set_frequency(1, 70.0e6).is_err());
        assert_eq!(
            awg.port().sent()[1..],
            [":w23=100000,0.", ":w24=1234,0.", ":w23=10000000,0."]
        );
    }
    #[test]
    fn amplitude_waveform_and_outputs() {
        let mut awg = generator(4);
        awg.set_amplitude(1, 2_000).unwrap();
        awg.set_waveform(2, Waveform::Triangle).unwrap();
        awg.set_outputs(true, false).unwrap();
        awg.set_waveform(1, Waveform::Sine).unwrap();
        assert!(awg.set_amplitude(1, 25_000).is_err());
        assert_eq!(
            awg.port().sent()[1..],
            [":w25=2000.", ":w22=3.", ":w20=1,0.", ":w21=0."]
        );
    }
    #[test]
    fn missing_acknowledgement_is_protocol_error() {
        let port = ScriptedPort::scripted("awg").reply(":r00=6015.").reply(":err");
        let mut awg = Jds6600::connect(port).unwrap();
        assert!(matches!(
            awg.set_frequency(1, 50.0),
            Err(LabError::Protocol { .. })
        ));
    }
}
