use std::io::Cursor;
use std::ops::Range;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::coord::Shift;
use plotters::prelude::*;
use crate::error::LabError;
use crate::response::sweep::round_sig_figs;
use crate::response::table::SweepTable;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub grid: RGBColor,
    pub magnitude: RGBColor,
    pub phase: RGBColor,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            background: RGBColor(10, 10, 10),
            grid: RGBColor(70, 70, 70),
            magnitude: BLUE,
            phase: RED,
        }
    }
}
/// Bode plot as PNG: magnitude in dB on top, phase in degrees below, both
/// against log10(frequency) with the axis labelled in Hz.
pub fn render_bode_png(table: &SweepTable, style: PlotStyle) -> Result<Vec<u8>, LabError> {
    let rows = table.rows();
    if rows.is_empty() {
        return Err(LabError::Plot("sweep table has no rows".into()));
    }
    if rows.iter().any(|r| !(r.freq > 0.0)) {
        return Err(LabError::Plot(
            "log frequency axis needs positive frequencies".into(),
        ));
    }
    let x = rows
        .iter()
        .map(|r| r.freq.log10())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let x_range = padded(x.0, x.1, 0.5);
    let db_range = bounds(rows.iter().map(|r| r.db), 10.0);
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let (upper, lower) = root.split_vertically(style.height / 2);
        let magnitude = rows.iter().map(|r| (r.freq.log10(), r.db));
        draw_panel(
            &upper,
            &style,
            MAGNITUDE_PANEL,
            x_range.clone(),
            db_range,
            magnitude,
            style.magnitude,
        )?;
        let phase = rows.iter().map(|r| (r.freq.log10(), r.phase));
        draw_panel(
            &lower,
            &style,
            PHASE_PANEL,
            x_range,
            -180.0..180.0,
            phase,
            style.phase,
        )?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn draw_panel<I>(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    style: &PlotStyle,
    panel: Panel,
    x_range: Range<f64>,
    y_range: Range<f64>,
    points: I,
    color: RGBColor,
) -> Result<(), LabError>
where
    I: Iterator<Item = (f64, f64)>,
{
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(panel.caption, ("sans-serif", 20).into_font().color(&WHITE))
        .set_label_area_size(LabelAreaPosition::Left, 55)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .bold_line_style(style.grid)
        .light_line_style(WHITE.mix(0.05))
        .label_style(("sans-serif", 13).into_font().color(&WHITE))
        .axis_desc_style(("sans-serif", 15).into_font().color(&WHITE))
        .x_desc("Frequency")
        .y_desc(panel.unit)
        .x_label_formatter(&hz_label)
        .y_labels(panel.y_labels)
        .draw()?;
    chart
        .draw_series(LineSeries::new(points, color.stroke_width(2)))?
        .label(panel.legend)
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    chart
        .configure_series_labels()
        .label_font(("sans-serif", 13).into_font().color(&WHITE))
        .border_style(WHITE.mix(0.2))
        .background_style(style.background)
        .draw()?;
    Ok(())
}
/// Text for one half of the Bode plot.
#[derive(Clone, Copy)]
struct Panel {
    caption: &'static str,
    unit: &'static str,
    legend: &'static str,
    y_labels: usize,
}
const MAGNITUDE_PANEL: Panel = Panel {
    caption: "Magnitude",
    unit: "dB",
    legend: "gain",
    y_labels: 10,
};
const PHASE_PANEL: Panel = Panel {
    caption: "Phase",
    unit: "degrees",
    legend: "phase",
    y_labels: 9,
};
/// Axis label for a position on the log10(frequency) axis.
fn hz_label(log_hz: &f64) -> String {
    let hz = 10f64.powf(*log_hz);
    if hz >= 1e6 {
        format!("{} MHz", round_sig_figs(hz / 1e6, 3))
    } else if hz >= 1e3 {
        format!("{} kHz", round_sig_figs(hz / 1e3, 3))
    } else {
        format!("{} Hz", round_sig_figs(hz, 3))
    }
}
fn padded(lo: f64, hi: f64, min_span: f64) -> Range<f64> {
    if hi - lo < min_span {
        let mid = (lo + hi) / 2.0;
        return (mid - min_span / 2.0)..(mid + min_span / 2.0);
    }
    let pad = (hi - lo) * 0.02;
    (lo - pad)..(hi + pad)
}
/// Range covering `values`, widened to whole multiples of `step`.
fn bounds(values: impl Iterator<Item = f64>, step: f64) -> Range<f64> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let lo = (lo / step).floor() * step;
    let hi = (hi / step).ceil() * step;
    if hi - lo < step {
        lo..(lo + step)
    } else {
        lo..hi
    }
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, LabError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| LabError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
