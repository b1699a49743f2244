// src/response/simulate.rs
// A generator driving a first-order RC low-pass, watched by an 8-bit scope.
//
// Channel 1 probes the filter output, channel 2 the generator output. The
// scope model clips at ±5 divisions and quantizes to 25 levels per division,
// so the vertical scale matters the way it does on the real instrument.
use std::f64::consts::TAU;
use log::trace;
use crate::error::LabError;
use crate::instruments::{SignalGenerator, WaveformScope};
const DIVISIONS_HORIZONTAL: f64 = 12.0;
const DIVISIONS_VERTICAL: f64 = 10.0;
const LEVELS_PER_DIVISION: f64 = 25.0;
const AUTO_MEMDEPTH: usize = 12_000;
/// Everything the simulated instruments were asked to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum ScopeEvent {
    Frequency(u8, f64),
    Run,
    Stop,
    ForceTrigger,
    Timebase(f64),
    Scale(u8, f64),
    Memdepth(Option<u32>),
    Fetch(u8),
}
pub struct SimulatedBench {
    cutoff_hz: f64,
    amplitude_pp: f64,
    frequency: f64,
    timebase: f64,
    memdepth: Option<u32>,
    scales: [f64; 2],
    captures: u32,
    events: Vec<ScopeEvent>,
}
impl SimulatedBench {
    /// Filter with corner `cutoff_hz` excited by a `amplitude_pp` volts peak-to-peak tone.
    pub fn rc_lowpass(cutoff_hz: f64, amplitude_pp: f64) -> Self {
        Self {
            cutoff_hz,
            amplitude_pp,
            frequency: 1_000.0,
            timebase: 1.0e-3,
            memdepth: None,
            scales: [1.0, 1.0],
            captures: 0,
            events: Vec::new(),
        }
    }
    pub fn set_excitation(&mut self, hz: f64) {
        self.frequency = hz;
    }
    pub fn events(&self) -> &[ScopeEvent] {
        &self.events
    }
    /// Gain and phase lag (degrees) of the filter at `hz`.
    pub fn response_at(&self, hz: f64) -> (f64, f64) {
        let x = hz / self.cutoff_hz;
        (1.0 / (1.0 + x * x).sqrt(), x.atan().to_degrees())
    }
    fn depth(&self) -> usize {
        self.memdepth.map(|d| d as usize).unwrap_or(AUTO_MEMDEPTH)
    }
    fn channel_index(channel: u8) -> Result<usize, LabError> {
        match channel {
            1 | 2 => Ok(channel as usize - 1),
            _ => Err(LabError::InvalidParameter(format!(
                "simulated scope has no channel {channel}"
            ))),
        }
    }
    fn digitize(&self, volts: f64, scale: f64) -> f64 {
        let limit = scale * DIVISIONS_VERTICAL / 2.0;
        let step = scale / LEVELS_PER_DIVISION;
        (volts.clamp(-limit, limit) / step).round() * step
    }
}
impl SignalGenerator for SimulatedBench {
    fn set_frequency(&mut self, channel: u8, hz: f64) -> Result<(), LabError> {
        self.events.push(ScopeEvent::Frequency(channel, hz));
        self.frequency = hz;
        Ok(())
    }
}
impl WaveformScope for SimulatedBench {
    fn run(&mut self) -> Result<(), LabError> {
        self.events.push(ScopeEvent::Run);
        Ok(())
    }
    fn stop(&mut self) -> Result<(), LabError> {
        self.events.push(ScopeEvent::Stop);
        Ok(())
    }
    fn force_trigger(&mut self) -> Result<(), LabError> {
        self.events.push(ScopeEvent::ForceTrigger);
        self.captures += 1;
        Ok(())
    }
    fn set_timebase(&mut self, seconds_per_div: f64) -> Result<(), LabError> {
        self.events.push(ScopeEvent::Timebase(seconds_per_div));
        self.timebase = seconds_per_div;
        Ok(())
    }
    fn set_channel_scale(&mut self, channel: u8, volts_per_div: f64) -> Result<(), LabError> {
        let idx = Self::channel_index(channel)?;
        self.events.push(ScopeEvent::Scale(channel, volts_per_div));
        self.scales[idx] = volts_per_div;
        Ok(())
    }
    fn set_memdepth(&mut self, depth: Option<u32>) -> Result<(), LabError> {
        self.events.push(ScopeEvent::Memdepth(depth));
        self.memdepth = depth;
        Ok(())
    }
    fn sample_interval(&mut self) -> Result<f64, LabError> {
        Ok(self.timebase * DIVISIONS_HORIZONTAL / self.depth() as f64)
    }
    fn fetch_waveform(&mut self, channel: u8) -> Result<Vec<f64>, LabError> {
        let idx = Self::channel_index(channel)?;
        self.events.push(ScopeEvent::Fetch(channel));
        let dt = self.sample_interval()?;
        let (gain, lag_deg) = match channel {
            1 => self.response_at(self.frequency),
            _ => (1.0, 0.0),
        };
        let peak = self.amplitude_pp / 2.0 * gain;
        // Each trigger lands at a different point of the excitation.
        let start = f64::from(self.captures) * 0.137 / self.frequency;
        let scale = self.scales[idx];
        trace!(
            "simulated capture ch{channel}: {} samples, dt {dt:e}, peak {peak}",
            self.depth()
        );
        Ok((0..self.depth())
            .map(|i| {
                let t = start + i as f64 * dt;
                let v = peak * (TAU * self.frequency * t - lag_deg.to_radians()).cos();
                self.digitize(v, scale)
            })
            .collect())
    }
}
