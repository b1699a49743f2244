// src/response/mod.rs
// Frequency response measurement: tone extraction from captured waveforms,
// automatic vertical ranging, sweep planning, and result rendering.
pub mod autorange;
pub mod dft;
pub mod measure;
pub mod plot;
pub mod simulate;
pub mod sweep;
pub mod table;
pub use autorange::{autorange, ChannelRange};
pub use dft::{extract, normalize_degrees, phase_delta, ToneReading};
pub use measure::{Measurement, MeasurementSettings, Response, ScopeMeasurement};
pub use plot::{render_bode_png, PlotStyle};
pub use simulate::SimulatedBench;
pub use sweep::{FrequencyPlan, Sweep, SweepError, SweepFailure};
pub use table::{ResponseRow, SweepTable};
