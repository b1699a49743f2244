use std::thread;
use std::time::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use crate::error::LabError;
use crate::instruments::{SignalGenerator, WaveformScope};
use crate::response::autorange::autorange;
use crate::response::dft::{extract, phase_delta};
/// Gain and phase of the device under test at one frequency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Response {
    /// Measurement amplitude over reference amplitude.
    pub ratio: f64,
    /// Measurement phase minus reference phase, degrees in (-180, 180].
    pub phase_deg: f64,
}
/// Anything that can measure the response at a frequency.
///
/// Closures `FnMut(f64) -> Result<Response, LabError>` qualify, which is
/// handy for stubs and for instruments this crate knows nothing about.
pub trait Measurement {
    fn measure(&mut self, frequency: f64) -> Result<Response, LabError>;
}
impl<F> Measurement for F
where
    F: FnMut(f64) -> Result<Response, LabError>,
{
    fn measure(&mut self, frequency: f64) -> Result<Response, LabError> {
        self(frequency)
    }
}
mod duration_ms {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
/// How the canonical scope/generator measurement is carried out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSettings {
    /// Base settle time after a forced trigger.
    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,
    /// Extra settle time in excitation periods, added to `delay`.
    pub settle_periods: f64,
    pub autorange: bool,
    /// Scope memory depth; `None` lets the scope pick.
    pub memdepth: Option<u32>,
    /// Autorange leaves the signal at about 1/headroom of full scale.
    pub headroom: f64,
    /// Volts per division used for the autorange probe capture.
    pub initial_scale: f64,
    pub generator_channel: u8,
    pub measure_channel: u8,
    pub reference_channel: u8,
}
impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            settle_periods: 40.0,
            autorange: false,
            memdepth: Some(120_000),
            headroom: 4.0,
            initial_scale: 1.0,
            generator_channel: 1,
            measure_channel: 1,
            reference_channel: 2,
        }
    }
}
impl MeasurementSettings {
    /// Settle time at `frequency`: slow signals need longer to fill the capture.
    pub fn settle_time(&self, frequency: f64) -> Result<Duration, LabError> {
        let periods = (self.settle_periods / frequency).max(0.0);
        let extra = Duration::try_from_secs_f64(periods).map_err(|_| {
            LabError::InvalidParameter(format!(
                "{} periods at {frequency} Hz is not a usable settle time",
                self.settle_periods
            ))
        })?;
        self.delay.checked_add(extra).ok_or_else(|| {
            LabError::InvalidParameter(format!("settle time overflows at {frequency} Hz"))
        })
    }
}
/// Excite with a generator, capture two scope channels, compare them.
pub struct ScopeMeasurement<B> {
    bench: B,
    settings: MeasurementSettings,
}
impl<B: SignalGenerator + WaveformScope> ScopeMeasurement<B> {
    pub fn new(bench: B, settings: MeasurementSettings) -> Self {
        Self { bench, settings }
    }
    pub fn settings(&self) -> &MeasurementSettings {
        &self.settings
    }
    pub fn bench(&self) -> &B {
        &self.bench
    }
    pub fn into_bench(self) -> B {
        self.bench
    }
}
impl<B: SignalGenerator + WaveformScope> Measurement for ScopeMeasurement<B> {
    fn measure(&mut self, frequency: f64) -> Result<Response, LabError> {
        if !(frequency > 0.0 && frequency.is_finite()) {
            return Err(LabError::InvalidParameter(format!(
                "cannot measure at {frequency} Hz"
            )));
        }
        let s = &self.settings;
        let bench = &mut self.bench;
        bench.set_frequency(s.generator_channel, frequency)?;
        bench.run()?;
        bench.set_memdepth(s.memdepth)?;
        bench.set_timebase(1.0 / frequency)?;
        let settle = s.settle_time(frequency)?;
        if s.autorange {
            autorange(
                bench,
                &[s.measure_channel, s.reference_channel],
                settle,
                s.initial_scale,
                s.headroom,
            )?;
        }
        bench.force_trigger()?;
        thread::sleep(settle);
        bench.stop()?;
        let dt = bench.sample_interval()?;
        let measured = extract(&bench.fetch_waveform(s.measure_channel)?, dt, frequency)?;
        let reference = extract(&bench.fetch_waveform(s.reference_channel)?, dt, frequency)?;
        if !(reference.amplitude > 0.0) {
            return Err(LabError::NoSignalDetected {
                channel: s.reference_channel,
            });
        }
        let response = Response {
            ratio: measured.amplitude / reference.amplitude,
            phase_deg: phase_delta(measured.phase_deg, reference.phase_deg),
        };
        debug!(
            "{frequency} Hz: ch{} {:.4} Vpp, ch{} {:.4} Vpp, {:.2} deg",
            s.measure_channel,
            measured.amplitude,
            s.reference_channel,
            reference.amplitude,
            response.phase_deg
        );
        Ok(response)
    }
}
