// src/instruments/mod.rs
// One file per instrument model. Each adapter owns its port and checks the
// instrument identity when it is constructed.
pub mod ds1054z;
pub mod et5410;
pub mod jds6600;
pub mod p2pro;
pub mod p4603;
pub mod relaymux;
pub mod tinysa;
pub mod xdm2041;
pub use ds1054z::Ds1054z;
pub use et5410::Et5410;
pub use jds6600::{Jds6600, Waveform};
pub use p2pro::{FrameSource, ManualFrames, P2Pro, ThermalFrame, ThermalSnapshot};
pub use p4603::P4603;
pub use relaymux::RelayMux;
pub use tinysa::TinySa;
pub use xdm2041::Xdm2041;
use crate::error::LabError;
use crate::port::InstrumentPort;
/// Something that can drive an excitation frequency.
pub trait SignalGenerator {
    fn set_frequency(&mut self, channel: u8, hz: f64) -> Result<(), LabError>;
}
/// Oscilloscope operations needed for a waveform capture.
pub trait WaveformScope {
    fn run(&mut self) -> Result<(), LabError>;
    fn stop(&mut self) -> Result<(), LabError>;
    fn force_trigger(&mut self) -> Result<(), LabError>;
    fn set_timebase(&mut self, seconds_per_div: f64) -> Result<(), LabError>;
    fn set_channel_scale(&mut self, channel: u8, volts_per_div: f64) -> Result<(), LabError>;
    /// `None` lets the instrument choose.
    fn set_memdepth(&mut self, depth: Option<u32>) -> Result<(), LabError>;
    fn sample_interval(&mut self) -> Result<f64, LabError>;
    /// Full capture buffer of `channel`, in volts.
    fn fetch_waveform(&mut self, channel: u8) -> Result<Vec<f64>, LabError>;
}
impl<T: SignalGenerator + ?Sized> SignalGenerator for &mut T {
    fn set_frequency(&mut self, channel: u8, hz: f64) -> Result<(), LabError> {
        (**self).set_frequency(channel, hz)
    }
}
impl<T: WaveformScope + ?Sized> WaveformScope for &mut T {
    fn run(&mut self) -> Result<(), LabError> {
        (**self).run()
    }
    fn stop(&mut self) -> Result<(), LabError> {
        (**self).stop()
    }
    fn force_trigger(&mut self) -> Result<(), LabError> {
        (**self).force_trigger()
    }
    fn set_timebase(&mut self, seconds_per_div: f64) -> Result<(), LabError> {
        (**self).set_timebase(seconds_per_div)
    }
    fn set_channel_scale(&mut self, channel: u8, volts_per_div: f64) -> Result<(), LabError> {
        (**self).set_channel_scale(channel, volts_per_div)
    }
    fn set_memdepth(&mut self, depth: Option<u32>) -> Result<(), LabError> {
        (**self).set_memdepth(depth)
    }
    fn sample_interval(&mut self) -> Result<f64, LabError> {
        (**self).sample_interval()
    }
    fn fetch_waveform(&mut self, channel: u8) -> Result<Vec<f64>, LabError> {
        (**self).fetch_waveform(channel)
    }
}
/// A generator and a scope wired together as one measurement setup.
pub struct Bench<G, S> {
    pub generator: G,
    pub scope: S,
}
impl<G: SignalGenerator, S> SignalGenerator for Bench<G, S> {
    fn set_frequency(&mut self, channel: u8, hz: f64) -> Result<(), LabError> {
        self.generator.set_frequency(channel, hz)
    }
}
impl<G, S: WaveformScope> WaveformScope for Bench<G, S> {
    fn run(&mut self) -> Result<(), LabError> {
        self.scope.run()
    }
    fn stop(&mut self) -> Result<(), LabError> {
        self.scope.stop()
    }
    fn force_trigger(&mut self) -> Result<(), LabError> {
        self.scope.force_trigger()
    }
    fn set_timebase(&mut self, seconds_per_div: f64) -> Result<(), LabError> {
        self.scope.set_timebase(seconds_per_div)
    }
    fn set_channel_scale(&mut self, channel: u8, volts_per_div: f64) -> Result<(), LabError> {
        self.scope.set_channel_scale(channel, volts_per_div)
    }
    fn set_memdepth(&mut self, depth: Option<u32>) -> Result<(), LabError> {
        self.scope.set_memdepth(depth)
    }
    fn sample_interval(&mut self) -> Result<f64, LabError> {
        self.scope.sample_interval()
    }
    fn fetch_waveform(&mut self, channel: u8) -> Result<Vec<f64>, LabError> {
        self.scope.fetch_waveform(channel)
    }
}
/// Query `*IDN?` and require `expected` to appear in the answer.
pub(crate) fn verify_identity<P: InstrumentPort>(
    port: &mut P,
    expected: &str,
) -> Result<String, LabError> {
    let response = port.query("*IDN?")?;
    if response.contains(expected) {
        log::info!("{}: connected to {}", port.name(), response);
        Ok(response)
    } else {
        Err(LabError::UnexpectedIdentity {
            expected: expected.to_string(),
            response,
        })
    }
}
