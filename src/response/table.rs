use std::fmt::Write as _;
use serde::Serialize;
use crate::error::LabError;
use crate::response::measure::Response;
pub const TABLE_HEADER: &str =
    "# Frequency(Hz)   Amplitude(abs)   Amplitude(dB)     Phase(deg)";
/// One measured point of a frequency response.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResponseRow {
    pub freq: f64,
    pub amplitude: f64,
    #[serde(rename = "dB")]
    pub db: f64,
    pub phase: f64,
}
impl ResponseRow {
    /// Fails with [`LabError::NonPositiveRatio`] when the ratio has no logarithm.
    pub fn new(freq: f64, response: Response) -> Result<Self, LabError> {
        let ratio = response.ratio;
        if !(ratio > 0.0 && ratio.is_finite()) {
            return Err(LabError::NonPositiveRatio { ratio });
        }
        Ok(Self {
            freq,
            amplitude: ratio,
            db: 10.0 * ratio.log10(),
            phase: response.phase_deg,
        })
    }
    pub fn format_line(&self) -> String {
        format!(
            "{:15.3}  {:15.9}  {:15.3}  {:15.3}",
            self.freq, self.amplitude, self.db, self.phase
        )
    }
}
/// Rows in measurement order. Only ever appended to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SweepTable {
    rows: Vec<ResponseRow>,
}
impl SweepTable {
    pub fn push(&mut self, row: ResponseRow) {
        self.rows.push(row);
    }
    pub fn rows(&self) -> &[ResponseRow] {
        &self.rows
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    /// Header line followed by one fixed-width line per row.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity((self.rows.len() + 1) * 68);
        out.push_str(TABLE_HEADER);
        out.push('\n');
        for row in &self.rows {
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{}", row.format_line());
        }
        out
    }
    /// One JSON object per line.
    pub fn to_json_lines(&self) -> Result<String, LabError> {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        Ok(out)
    }
}
impl FromIterator<ResponseRow> for SweepTable {
    fn from_iter<I: IntoIterator<Item = ResponseRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
impl Extend<ResponseRow> for SweepTable {
    fn extend<I: IntoIterator<Item = ResponseRow>>(&mut self, iter: I) {
        self.rows.extend(iter);
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn row(freq: f64, ratio: f64, phase_deg: f64) -> ResponseRow {
        ResponseRow::new(freq, Response { ratio, phase_deg }).unwrap()
    }
    #[test]
    fn decibels_are_ten_log_ratio() {
        assert_eq!(row(1.0, 1.0, 0.0).db, 0.0);
        assert!((row(1.0, 10.0, 0.0).db - 10.0).abs() < 1e-12);
        assert!((row(1.0, 0.5, 0.0).db + 3.0103).abs() < 1e-4);
    }
    #[test]
    fn nonpositive_ratio_is_rejected() {
        for ratio in [0.0, -0.5, f64::NAN] {
            let err = ResponseRow::new(100.0, Response { ratio, phase_deg: 0.0 }).unwrap_err();
            assert!(matches!(err, LabError::NonPositiveRatio { .. }));
        }
    }
    #[test]
    fn fixed_width_rendering() {
        let table: SweepTable = [row(100.0, 1.0, -1.5), row(1_000.0, 0.5, -45.0)]
            .into_iter()
            .collect();
        let text = table.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], TABLE_HEADER);
        assert_eq!(
            lines[1],
            "        100.000      1.000000000            0.000           -1.500"
        );
        assert_eq!(
            lines[2],
            "       1000.000      0.500000000           -3.010          -45.000"
        );
        assert_eq!(lines.len(), 3);
    }
    #[test]
    fn json_lines_use_db_key() {
        let table: SweepTable = [row(100.0, 1.0, 0.0)].into_iter().collect();
        let json = table.to_json_lines().unwrap();
        assert_eq!(json, "{\"freq\":100.0,\"amplitude\":1.0,\"dB\":0.0,\"phase\":0.0}\n");
    }
    #[test]
    fn empty_table_renders_header_only() {
        let table = SweepTable::default();
        assert!(table.is_empty());
        assert_eq!(table.render(), format!("{TABLE_HEADER}\n"));
        assert_eq!(table.to_json_lines().unwrap(), "");
    }
}
