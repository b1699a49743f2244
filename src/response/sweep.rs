// src/response/sweep.rs
// Frequency list generation and the point-by-point sweep driver.
use std::iter::FusedIterator;
use log::{debug, info};
use thiserror::Error;
use crate::error::LabError;
use crate::response::measure::Measurement;
use crate::response::table::{ResponseRow, SweepTable};
/// Which frequencies a sweep visits.
#[derive(Clone, Debug, PartialEq)]
pub enum FrequencyPlan {
    /// `steps_per_decade` points per decade from `min` until `max` is reached,
    /// rounded to a few significant figures.
    Logarithmic {
        min: f64,
        max: f64,
        steps_per_decade: u32,
    },
    /// `min, min + interval, ...` up to but excluding `max`.
    Linear { min: f64, max: f64, interval: f64 },
}
impl FrequencyPlan {
    /// Log plan unless `lin_interval` is given, mirroring the command line.
    pub fn from_options(min: f64, max: f64, steps_per_decade: u32, lin_interval: Option<f64>) -> Self {
        match lin_interval {
            Some(interval) => FrequencyPlan::Linear { min, max, interval },
            None => FrequencyPlan::Logarithmic {
                min,
                max,
                steps_per_decade,
            },
        }
    }
    pub fn frequencies(&self) -> Result<Vec<f64>, LabError> {
        match *self {
            FrequencyPlan::Logarithmic {
                min,
                max,
                steps_per_decade,
            } => log_frequencies(min, max, steps_per_decade),
            FrequencyPlan::Linear { min, max, interval } => linear_frequencies(min, max, interval),
        }
    }
}
fn log_frequencies(min: f64, max: f64, steps_per_decade: u32) -> Result<Vec<f64>, LabError> {
    if !(min > 0.0 && max > min && max.is_finite()) {
        return Err(LabError::InvalidParameter(format!(
            "log sweep needs 0 < min < max, got {min}..{max}"
        )));
    }
    if steps_per_decade == 0 {
        return Err(LabError::InvalidParameter(
            "log sweep needs at least one step per decade".into(),
        ));
    }
    let per_decade = f64::from(steps_per_decade);
    let figures = steps_per_decade.div_ceil(10) + 1;
    // The small bias keeps an exact number of decades from gaining a point to rounding.
    let steps = ((max / min).log10() * per_decade - 1e-9).ceil().max(0.0) as usize;
    let first = min.log10() * per_decade;
    Ok((0..=steps)
        .map(|i| round_sig_figs(10f64.powf((first + i as f64) / per_decade), figures))
        .collect())
}
fn linear_frequencies(min: f64, max: f64, interval: f64) -> Result<Vec<f64>, LabError> {
    if !(interval > 0.0 && interval.is_finite()) {
        return Err(LabError::InvalidParameter(format!(
            "linear sweep interval must be positive, got {interval}"
        )));
    }
    if !(min >= 0.0 && max > min && max.is_finite()) {
        return Err(LabError::InvalidParameter(format!(
            "linear sweep needs 0 <= min < max, got {min}..{max}"
        )));
    }
    let count = ((max - min) / interval).ceil() as usize;
    Ok((0..count).map(|i| min + i as f64 * interval).collect())
}
/// Round to `figures` significant figures.
pub fn round_sig_figs(value: f64, figures: u32) -> f64 {
    if value == 0.0 || !value.is_finite() || figures == 0 {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = figures as i32 - 1 - magnitude;
    let factor = 10f64.powi(decimals.abs());
    if decimals >= 0 {
        (value * factor).round() / factor
    } else {
        (value / factor).round() * factor
    }
}
/// A sweep point failed; no row was produced for it.
#[derive(Debug, Error)]
#[error("measurement at {frequency} Hz failed: {source}")]
pub struct SweepError {
    pub frequency: f64,
    #[source]
    pub source: LabError,
}
/// The sweep stopped early. `completed` holds every row measured before the failure.
#[derive(Debug, Error)]
#[error("sweep aborted after {} points: {error}", completed.len())]
pub struct SweepFailure {
    pub completed: SweepTable,
    #[source]
    pub error: SweepError,
}
/// Lazily measures one frequency per `next()`.
///
/// Dropping the iterator early simply stops the sweep. After the first error
/// it yields nothing more, since later points would hit the same condition.
pub struct Sweep<M> {
    frequencies: std::vec::IntoIter<f64>,
    measurement: M,
    total: usize,
    failed: bool,
}
impl<M: Measurement> Sweep<M> {
    pub fn new(plan: &FrequencyPlan, measurement: M) -> Result<Self, LabError> {
        let frequencies = plan.frequencies()?;
        info!("sweep: {} points", frequencies.len());
        Ok(Self::over(frequencies, measurement))
    }
    /// Sweep an explicit frequency list.
    pub fn over(frequencies: Vec<f64>, measurement: M) -> Self {
        Self {
            total: frequencies.len(),
            frequencies: frequencies.into_iter(),
            measurement,
            failed: false,
        }
    }
    pub fn total_points(&self) -> usize {
        self.total
    }
    /// Measure every point and collect the table.
    pub fn run(self) -> Result<SweepTable, SweepFailure> {
        let mut completed = SweepTable::default();
        for result in self {
            match result {
                Ok(row) => completed.push(row),
                Err(error) => return Err(SweepFailure { completed, error }),
            }
        }
        Ok(completed)
    }
}
impl<M: Measurement> Iterator for Sweep<M> {
    type Item = Result<ResponseRow, SweepError>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let frequency = self.frequencies.next()?;
        let result = self
            .measurement
            .measure(frequency)
            .and_then(|response| ResponseRow::new(frequency, response));
        match result {
            Ok(row) => {
                debug!(
                    "sweep: {frequency} Hz -> {:.3} dB, {:.3} deg",
                    row.db, row.phase
                );
                Some(Ok(row))
            }
            Err(source) => {
                self.failed = true;
                Some(Err(SweepError { frequency, source }))
            }
        }
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            (0, Some(self.frequencies.len()))
        }
    }
}
impl<M: Measurement> FusedIterator for Sweep<M> {}
