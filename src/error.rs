use std::io;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum LabError {
    #[error("communication with {instrument} failed: {source}")]
    Communication {
        instrument: String,
        #[source]
        source: io::Error,
    },
    #[error("{instrument} sent a malformed response: {detail}")]
    Protocol { instrument: String, detail: String },
    #[error("unexpected identity (expected {expected}): {response:?}")]
    UnexpectedIdentity { expected: String, response: String },
    #[error(
        "sample interval {sample_interval:e} s is too coarse for {frequency} Hz \
         ({samples_per_period} samples per period, need at least 5)"
    )]
    InsufficientResolution {
        frequency: f64,
        sample_interval: f64,
        samples_per_period: usize,
    },
    #[error(
        "capture of {samples} samples is shorter than one period of {frequency} Hz \
         ({samples_per_period} samples)"
    )]
    InsufficientDuration {
        frequency: f64,
        samples: usize,
        samples_per_period: usize,
    },
    #[error("no signal detected on channel {channel}")]
    NoSignalDetected { channel: u8 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("amplitude ratio must be positive, got {ratio}")]
    NonPositiveRatio { ratio: f64 },
    #[error("output voltage is {measured} V, target {target} V")]
    VoltageNotReached { measured: f64, target: f64 },
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl LabError {
    pub(crate) fn protocol(instrument: &str, detail: impl Into<String>) -> Self {
        LabError::Protocol {
            instrument: instrument.to_string(),
            detail: detail.into(),
        }
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for LabError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        LabError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for LabError {
    fn from(value: image::ImageError) -> Self {
        LabError::Plot(value.to_string())
    }
}
impl From<serde_json::Error> for LabError {
    fn from(value: serde_json::Error) -> Self {
        LabError::Config(value.to_string())
    }
}
