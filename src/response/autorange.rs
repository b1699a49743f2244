use std::thread;
use std::time::Duration;
use log::debug;
use crate::error::LabError;
use crate::instruments::WaveformScope;
/// Vertical scale chosen for one channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelRange {
    pub channel: u8,
    /// Largest absolute sample seen in the probe capture, volts.
    pub peak: f64,
    /// Requested volts per division.
    pub scale: f64,
}
/// Probe the signal on `channels` and set each channel's scale to `peak / headroom`.
///
/// Every call re-measures from `initial_scale`; nothing is remembered between
/// calls. If any channel shows no signal no scale is changed and
/// [`LabError::NoSignalDetected`] is returned, leaving the scope stopped.
/// On success acquisition is running again.
pub fn autorange<S: WaveformScope + ?Sized>(
    scope: &mut S,
    channels: &[u8],
    settle: Duration,
    initial_scale: f64,
    headroom: f64,
) -> Result<Vec<ChannelRange>, LabError> {
    if !(headroom > 0.0) || !(initial_scale > 0.0) {
        return Err(LabError::InvalidParameter(format!(
            "autorange needs positive headroom and initial scale, got {headroom} and {initial_scale}"
        )));
    }
    for &channel in channels {
        scope.set_channel_scale(channel, initial_scale)?;
    }
    scope.force_trigger()?;
    thread::sleep(settle);
    scope.stop()?;
    let mut ranges = Vec::with_capacity(channels.len());
    for &channel in channels {
        let peak = scope
            .fetch_waveform(channel)?
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        if !(peak > 0.0 && peak.is_finite()) {
            return Err(LabError::NoSignalDetected { channel });
        }
        ranges.push(ChannelRange {
            channel,
            peak,
            scale: peak / headroom,
        });
    }
    for range in &ranges {
        debug!(
            "autorange: channel {} peak {:.4} V -> {:.4} V/div",
            range.channel, range.peak, range.scale
        );
        scope.set_channel_scale(range.channel, range.scale)?;
    }
    scope.run()?;
    Ok(ranges)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::simulate::{ScopeEvent, SimulatedBench};
    #[test]
    fn scales_follow_peaks() {
        let mut bench = SimulatedBench::rc_lowpass(1.0e9, 2.0);
        bench.set_excitation(1_000.0);
        let ranges = autorange(&mut bench, &[1, 2], Duration::ZERO, 1.0, 4.0).unwrap();
        assert_eq!(ranges.len(), 2);
        for range in &ranges {
            // 2 Vpp tone, far below the cutoff: peak 1 V on both channels.
            assert!((range.peak - 1.0).abs() < 1e-3, "{range:?}");
            assert!((range.scale - 0.25).abs() < 1e-3);
        }
        let events = bench.events();
        assert_eq!(events.last(), Some(&ScopeEvent::Run));
        assert!(events.contains(&ScopeEvent::Scale(1, 1.0)));
        assert!(events.contains(&ScopeEvent::Scale(2, ranges[1].scale)));
    }
    #[test]
    fn repeated_calls_remeasure() {
        let mut bench = SimulatedBench::rc_lowpass(1.0e9, 2.0);
        bench.set_excitation(1_000.0);
        let first = autorange(&mut bench, &[1], Duration::ZERO, 1.0, 4.0).unwrap();
        let second = autorange(&mut bench, &[1], Duration::ZERO, 1.0, 4.0).unwrap();
        assert_eq!(first, second);
        let initial_sets = bench
            .events()
            .iter()
            .filter(|e| **e == ScopeEvent::Scale(1, 1.0))
            .count();
        assert_eq!(initial_sets, 2);
    }
    #[test]
    fn silent_channel_leaves_scales_alone() {
        let mut bench = SimulatedBench::rc_lowpass(1.0e9, 0.0);
        bench.set_excitation(1_000.0);
        let err = autorange(&mut bench, &[1, 2], Duration::ZERO, 1.0, 4.0).unwrap_err();
        assert!(matches!(err, LabError::NoSignalDetected { channel: 1 }));
        let non_initial = bench
            .events()
            .iter()
            .filter(|e| matches!(e, ScopeEvent::Scale(_, s) if *s != 1.0))
            .count();
        assert_eq!(non_initial, 0);
    }
}
