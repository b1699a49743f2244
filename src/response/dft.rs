// src/response/dft.rs
// Amplitude and phase of one known frequency in a sampled waveform.
//
// Instead of a full spectrum this projects the capture onto a single complex
// exponential. Only whole periods are used, so the excitation tone lands
// exactly on the bin and there is no leakage from the truncated edge.
use std::f64::consts::TAU;
use rustfft::num_complex::Complex64;
use crate::error::LabError;
/// Fewer samples per period than this makes a single-bin DFT unreliable.
pub const MIN_SAMPLES_PER_PERIOD: usize = 5;
/// Peak-to-peak amplitude and phase of a single tone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneReading {
    /// Peak-to-peak amplitude, in the units of the input samples.
    pub amplitude: f64,
    /// Phase in degrees, in (-180, 180].
    pub phase_deg: f64,
}
/// Samples per period of `target_freq`, before checking it is usable.
pub fn samples_per_period(sample_interval: f64, target_freq: f64) -> usize {
    (1.0 / (target_freq * sample_interval)).round() as usize
}
/// Single-bin DFT of `samples` at `target_freq`.
///
/// The kernel is `exp(+j·2π·k·periods/N)`, so a tone `cos(ωt − φ)` reads back
/// with phase `φ`: the reported phase grows with delay.
pub fn extract(
    samples: &[f64],
    sample_interval: f64,
    target_freq: f64,
) -> Result<ToneReading, LabError> {
    if !(target_freq > 0.0 && target_freq.is_finite()) {
        return Err(LabError::InvalidParameter(format!(
            "target frequency must be positive, got {target_freq}"
        )));
    }
    if !(sample_interval > 0.0 && sample_interval.is_finite()) {
        return Err(LabError::InvalidParameter(format!(
            "sample interval must be positive, got {sample_interval}"
        )));
    }
    let per_period = samples_per_period(sample_interval, target_freq);
    if per_period < MIN_SAMPLES_PER_PERIOD {
        return Err(LabError::InsufficientResolution {
            frequency: target_freq,
            sample_interval,
            samples_per_period: per_period,
        });
    }
    let periods = samples.len() / per_period;
    if periods < 1 {
        return Err(LabError::InsufficientDuration {
            frequency: target_freq,
            samples: samples.len(),
            samples_per_period: per_period,
        });
    }
    let used = periods * per_period;
    let step = TAU * periods as f64 / used as f64;
    let sum: Complex64 = samples[..used]
        .iter()
        .enumerate()
        .map(|(k, &v)| Complex64::from_polar(v, step * k as f64))
        .sum();
    let coefficient = sum / used as f64;
    Ok(ToneReading {
        // |c| is half the peak amplitude of a single tone, so 4|c| is peak-to-peak.
        amplitude: 4.0 * coefficient.norm(),
        phase_deg: normalize_degrees(coefficient.arg().to_degrees()),
    })
}
/// Wrap an angle into (-180, 180].
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}
/// Phase of the measurement channel relative to the reference channel.
pub fn phase_delta(measured_deg: f64, reference_deg: f64) -> f64 {
    normalize_degrees(measured_deg - reference_deg)
}
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    /// `pp/2 · cos(2π f t − φ)`, i.e. peak-to-peak `pp` delayed by `φ`.
    fn tone(pp: f64, phase_deg: f64, freq: f64, dt: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| pp / 2.0 * (TAU * freq * i as f64 * dt - phase_deg.to_radians()).cos())
            .collect()
    }
    fn angle_diff(a: f64, b: f64) -> f64 {
        normalize_degrees(a - b).abs()
    }
    #[test]
    fn recovers_known_tone() {
        // 20 samples per period, 7 periods plus a partial one.
        let dt = 1.0e-5;
        let freq = 5_000.0;
        for &(pp, phase) in &[(2.0, 30.0), (0.35, -120.0), (7.5, 179.0), (1.0, 0.0)] {
            let samples = tone(pp, phase, freq, dt, 153);
            let reading = extract(&samples, dt, freq).unwrap();
            assert!(
                (reading.amplitude - pp).abs() / pp < 0.01,
                "amplitude {} vs {pp}",
                reading.amplitude
            );
            assert!(
                angle_diff(reading.phase_deg, phase) < 1.0,
                "phase {} vs {phase}",
                reading.phase_deg
            );
        }
    }
    #[test]
    fn tolerates_noise_and_dc_offset() {
        let dt = 1.0e-6;
        let freq = 10_000.0;
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<f64> = tone(3.0, 45.0, freq, dt, 12_000)
            .into_iter()
            .map(|v| v + 0.8 + rng.gen_range(-0.05..0.05))
            .collect();
        let reading = extract(&samples, dt, freq).unwrap();
        assert!((reading.amplitude - 3.0).abs() / 3.0 < 0.01);
        assert!(angle_diff(reading.phase_deg, 45.0) < 1.0);
    }
    #[test]
    fn whole_period_shift_changes_nothing() {
        let dt = 1.0e-4;
        let freq = 250.0; // 40 samples per period
        let long = tone(1.5, 60.0, freq, dt, 40 * 12);
        let a = extract(&long[..400], dt, freq).unwrap();
        let b = extract(&long[80..480], dt, freq).unwrap();
        assert!((a.amplitude - b.amplitude).abs() < 1e-9);
        assert!(angle_diff(a.phase_deg, b.phase_deg) < 1e-6);
    }
    #[test]
    fn partial_shift_moves_phase_linearly() {
        let dt = 1.0e-4;
        let freq = 250.0; // 40 samples per period
        let long = tone(1.5, 60.0, freq, dt, 40 * 12);
        let base = extract(&long[..400], dt, freq).unwrap();
        // Starting 10 samples later is a quarter period earlier in the wave.
        let shifted = extract(&long[10..410], dt, freq).unwrap();
        assert!((base.amplitude - shifted.amplitude).abs() < 1e-9);
        assert!(angle_diff(shifted.phase_deg, base.phase_deg - 90.0) < 1e-6);
    }
    #[test]
    fn too_few_samples_per_period() {
        // 1/(50 kHz · 5 µs) = 4 samples per period.
        let samples = vec![0.0; 1000];
        let err = extract(&samples, 5.0e-6, 50_000.0).unwrap_err();
        assert!(matches!(
            err,
            LabError::InsufficientResolution {
                samples_per_period: 4,
                ..
            }
        ));
    }
    #[test]
    fn shorter_than_one_period() {
        let samples = vec![0.1; 99];
        let err = extract(&samples, 1.0e-5, 1_000.0).unwrap_err();
        assert!(matches!(
            err,
            LabError::InsufficientDuration {
                samples: 99,
                samples_per_period: 100,
                ..
            }
        ));
    }
    #[test]
    fn rejects_nonpositive_inputs() {
        assert!(matches!(
            extract(&[0.0; 10], 1.0e-3, 0.0),
            Err(LabError::InvalidParameter(_))
        ));
        assert!(matches!(
            extract(&[0.0; 10], -1.0, 10.0),
            Err(LabError::InvalidParameter(_))
        ));
    }
    #[test]
    fn phase_delta_wraps_around() {
        assert!((phase_delta(170.0, -170.0) - (-20.0)).abs() < 1e-9);
        assert!((phase_delta(-170.0, 170.0) - 20.0).abs() < 1e-9);
        assert_eq!(phase_delta(90.0, -90.0), 180.0);
        assert_eq!(phase_delta(10.0, 10.0), 0.0);
    }
}
