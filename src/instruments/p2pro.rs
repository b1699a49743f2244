// src/instruments/p2pro.rs
// InfiRay P2Pro thermal camera.
//
// The camera enumerates as a UVC device producing YUYV frames twice as tall
// as the sensor: the upper half is a preview image, the lower half carries
// one little-endian u16 per pixel in units of 1/64 kelvin. Grabbing the frames
// is left to a `FrameSource` so the decoding and rendering here do not
// depend on a particular video stack.
use std::collections::VecDeque;
use std::thread;
use std::time::Duration;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use log::debug;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use crate::error::LabError;
const CAPTURE_ATTEMPTS: usize = 100;
const SCALE_BAR_AREA: u32 = 80;
const LABEL_SIZE: f64 = 10.0;
/// One frame as delivered by the video device, 2 bytes per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}
/// Source of raw frames. `Ok(None)` means no frame is ready yet.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Option<RawFrame>, LabError>;
}
/// Frames queued by hand, for replaying recordings and for tests.
#[derive(Default)]
pub struct ManualFrames {
    queue: VecDeque<Option<RawFrame>>,
}
impl ManualFrames {
    pub fn push(&mut self, frame: RawFrame) {
        self.queue.push_back(Some(frame));
    }
    /// Queue a read that finds no frame ready.
    pub fn push_not_ready(&mut self) {
        self.queue.push_back(None);
    }
}
impl FrameSource for ManualFrames {
    fn read_frame(&mut self) -> Result<Option<RawFrame>, LabError> {
        Ok(self.queue.pop_front().flatten())
    }
}
/// Temperatures in degrees Celsius, row major.
#[derive(Clone, Debug, PartialEq)]
pub struct ThermalFrame {
    pub width: usize,
    pub height: usize,
    pub celsius: Vec<f64>,
}
impl ThermalFrame {
    /// Decode the temperature half of a raw frame.
    pub fn decode(raw: &RawFrame) -> Result<Self, LabError> {
        let expected = raw.width * raw.height * 2;
        if raw.width == 0 || raw.height < 2 || raw.height % 2 != 0 || raw.data.len() != expected {
            return Err(LabError::CaptureFailed(format!(
                "{}x{} frame with {} bytes",
                raw.width,
                raw.height,
                raw.data.len()
            )));
        }
        let half = raw.data.len() / 2;
        let celsius = raw.data[half..]
            .chunks_exact(2)
            .map(|b| f64::from(u16::from_le_bytes([b[0], b[1]])) / 64.0 - 273.15)
            .collect();
        Ok(Self {
            width: raw.width,
            height: raw.height / 2,
            celsius,
        })
    }
    pub fn at(&self, x: usize, y: usize) -> f64 {
        self.celsius[y * self.width + x]
    }
    fn position(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }
    /// Coldest pixel as `(x, y, celsius)`.
    pub fn min(&self) -> (usize, usize, f64) {
        let (idx, t) = self
            .celsius
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, t)| if t < best.1 { (i, t) } else { best });
        let (x, y) = self.position(idx);
        (x, y, t)
    }
    /// Hottest pixel as `(x, y, celsius)`.
    pub fn max(&self) -> (usize, usize, f64) {
        let (idx, t) = self
            .celsius
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, t)| if t > best.1 { (i, t) } else { best });
        let (x, y) = self.position(idx);
        (x, y, t)
    }
}
/// Temperature to color mapping, linear between stops and clamped at both ends.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    stops: Vec<(f64, [u8; 3])>,
}
impl Default for Palette {
    fn default() -> Self {
        Self {
            stops: vec![
                (-20.0, [0, 0, 0]),
                (0.0, [0, 0, 255]),
                (20.0, [0, 128, 128]),
                (40.0, [0, 255, 0]),
                (60.0, [255, 255, 0]),
                (80.0, [200, 128, 0]),
                (100.0, [255, 0, 0]),
                (120.0, [200, 0, 255]),
            ],
        }
    }
}
impl Palette {
    /// Stops must be given in increasing temperature order.
    pub fn new(stops: Vec<(f64, [u8; 3])>) -> Result<Self, LabError> {
        if stops.is_empty() || stops.windows(2).any(|w| !(w[0].0 < w[1].0)) {
            return Err(LabError::InvalidParameter(
                "palette needs increasing temperature stops".into(),
            ));
        }
        Ok(Self { stops })
    }
    pub fn stops(&self) -> &[(f64, [u8; 3])] {
        &self.stops
    }
    pub fn range(&self) -> (f64, f64) {
        let first = self.stops[0].0;
        let last = self.stops[self.stops.len() - 1].0;
        (first, last)
    }
    pub fn color(&self, celsius: f64) -> Rgb<u8> {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if !(celsius > first.0) {
            return Rgb(first.1);
        }
        if celsius >= last.0 {
            return Rgb(last.1);
        }
        let upper = self.stops.iter().position(|s| s.0 > celsius).unwrap_or(self.stops.len() - 1);
        let (t0, c0) = self.stops[upper - 1];
        let (t1, c1) = self.stops[upper];
        let f = (celsius - t0) / (t1 - t0);
        let mut rgb = [0u8; 3];
        for (out, (a, b)) in rgb.iter_mut().zip(c0.iter().zip(c1.iter())) {
            *out = (f64::from(*a) + (f64::from(*b) - f64::from(*a)) * f) as u8;
        }
        Rgb(rgb)
    }
    pub fn map(&self, frame: &ThermalFrame) -> RgbImage {
        ImageBuffer::from_fn(frame.width as u32, frame.height as u32, |x, y| {
            self.color(frame.at(x as usize, y as usize))
        })
    }
}
/// A highlighted point of a snapshot, in sensor coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct ThermalMarker {
    pub x: usize,
    pub y: usize,
    pub celsius: f64,
    pub label: String,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub scale: bool,
    pub min_point: bool,
    pub max_point: bool,
    pub center_point: bool,
}
impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            scale: true,
            min_point: true,
            max_point: true,
            center_point: true,
        }
    }
}
pub struct ThermalSnapshot {
    /// False color image at twice the sensor resolution, scale bar on the right.
    pub image: RgbImage,
    pub frame: ThermalFrame,
    pub markers: Vec<ThermalMarker>,
}
pub struct P2Pro<S> {
    source: S,
    palette: Palette,
    retry_interval: Duration,
}
impl<S: FrameSource> P2Pro<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            palette: Palette::default(),
            retry_interval: Duration::from_millis(10),
        }
    }
    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
    pub fn capture(&mut self) -> Result<ThermalFrame, LabError> {
        for attempt in 0..CAPTURE_ATTEMPTS {
            if let Some(raw) = self.source.read_frame()? {
                debug!("p2pro: frame after {attempt} retries");
                return ThermalFrame::decode(&raw);
            }
            thread::sleep(self.retry_interval);
        }
        Err(LabError::CaptureFailed(format!(
            "no video frame after {CAPTURE_ATTEMPTS} attempts"
        )))
    }
    pub fn snapshot(&mut self, options: SnapshotOptions) -> Result<ThermalSnapshot, LabError> {
        let frame = self.capture()?;
        let (w, h) = (frame.width as u32, frame.height as u32);
        let thermal = imageops::resize(&self.palette.map(&frame), w * 2, h * 2, FilterType::Nearest);
        let bar = if options.scale { SCALE_BAR_AREA } else { 0 };
        let (width, height) = (w * 2 + bar, h * 2);
        let mut markers = Vec::new();
        if options.min_point {
            let (x, y, t) = frame.min();
            markers.push(ThermalMarker { x, y, celsius: t, label: format!("min {t:.1} °C") });
        }
        if options.max_point {
            let (x, y, t) = frame.max();
            markers.push(ThermalMarker { x, y, celsius: t, label: format!("max {t:.1} °C") });
        }
        if options.center_point {
            let (x, y) = (frame.width / 2, frame.height / 2);
            let t = frame.at(x, y);
            markers.push(ThermalMarker { x, y, celsius: t, label: format!("{t:.1} °C") });
        }
        let mut canvas = vec![0u8; (width * height * 3) as usize];
        for (y, row) in thermal.rows().enumerate() {
            let start = y * width as usize * 3;
            for (x, pixel) in row.enumerate() {
                canvas[start + x * 3..start + x * 3 + 3].copy_from_slice(&pixel.0);
            }
        }
        {
            let root = BitMapBackend::with_buffer(&mut canvas, (width, height)).into_drawing_area();
            if options.scale && height > 20 {
                self.draw_scale(&root, (w * 2 + 5) as i32, 10, 10, height as i32 - 20)?;
            }
            for marker in &markers {
                let (x, y) = ((marker.x * 2) as i32, (marker.y * 2) as i32);
                root.draw(&Circle::new((x, y), 3, WHITE.stroke_width(1)))?;
                root.draw(&PathElement::new(vec![(x + 3, y), (x + 5, y)], WHITE))?;
                root.draw(&Text::new(marker.label.as_str(), (x + 8, y), label_style()))?;
            }
            root.present()?;
        }
        let image = RgbImage::from_raw(width, height, canvas)
            .ok_or_else(|| LabError::Plot("failed to allocate snapshot buffer".into()))?;
        Ok(ThermalSnapshot { image, frame, markers })
    }
    /// Vertical color bar from the hottest palette stop (top) to the coldest,
    /// with a tick in the stop's color and its temperature at every palette stop.
    fn draw_scale(
        &self,
        root: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
    ) -> Result<(), LabError> {
        let (lo, hi) = self.palette.range();
        let span = (h - 1).max(1) as f64;
        for row in 0..h {
            let t = hi - (hi - lo) * row as f64 / span;
            let Rgb([r, g, b]) = self.palette.color(t);
            root.draw(&Rectangle::new(
                [(x, y + row), (x + w, y + row + 1)],
                RGBColor(r, g, b).filled(),
            ))?;
        }
        for &(t, [r, g, b]) in self.palette.stops() {
            let ypos = y + ((hi - t) / (hi - lo).max(f64::EPSILON) * span).round() as i32;
            root.draw(&PathElement::new(
                vec![(x + w, ypos), (x + w + 5, ypos)],
                RGBColor(r, g, b),
            ))?;
            root.draw(&Text::new(format!("{t:.0} °C"), (x + w + 7, ypos), label_style()))?;
        }
        Ok(())
    }
}
/// White text, left aligned and vertically centered on its anchor.
fn label_style() -> TextStyle<'static> {
    ("sans-serif", LABEL_SIZE)
        .into_font()
        .color(&WHITE)
        .pos(Pos::new(HPos::Left, VPos::Center))
}
#[cfg(test)]
mod tests {
    use super::*;
    /// `width` x `height` sensor frame; the preview half is filled with 0xAA.
    fn raw_frame(width: usize, height: usize, kelvin64: impl Fn(usize, usize) -> u16) -> RawFrame {
        let mut data = vec![0xAA; width * height * 2];
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&kelvin64(x, y).to_le_bytes());
            }
        }
        RawFrame {
            width,
            height: height * 2,
            data,
        }
    }
    fn celsius_to_raw(c: f64) -> u16 {
        ((c + 273.15) * 64.0).round() as u16
    }
    #[test]
    fn decodes_lower_half() {
        let raw = raw_frame(4, 3, |x, y| celsius_to_raw(20.0 + (x + 4 * y) as f64));
        let frame = ThermalFrame::decode(&raw).unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert!((frame.at(0, 0) - 20.0).abs() < 0.01);
        assert!((frame.at(3, 2) - 31.0).abs() < 0.01);
        let (x, y, t) = frame.max();
        assert_eq!((x, y), (3, 2));
        assert!((t - 31.0).abs() < 0.01);
        let (x, y, _) = frame.min();
        assert_eq!((x, y), (0, 0));
    }
    #[test]
    fn malformed_frames_are_rejected() {
        let mut raw = raw_frame(4, 3, |_, _| 0);
        raw.data.pop();
        assert!(matches!(ThermalFrame::decode(&raw), Err(LabError::CaptureFailed(_))));
    }
    #[test]
    fn palette_interpolates_and_clamps() {
        let palette = Palette::default();
        assert_eq!(palette.color(-50.0), Rgb([0, 0, 0]));
        assert_eq!(palette.color(500.0), Rgb([200, 0, 255]));
        assert_eq!(palette.color(0.0), Rgb([0, 0, 255]));
        assert_eq!(palette.color(10.0), Rgb([0, 64, 191]));
        assert_eq!(palette.color(50.0), Rgb([127, 255, 0]));
        assert!(Palette::new(vec![(10.0, [0; 3]), (5.0, [0; 3])]).is_err());
    }
    #[test]
    fn capture_retries_until_a_frame_arrives() {
        let mut frames = ManualFrames::default();
        for _ in 0..5 {
            frames.push_not_ready();
        }
        frames.push(raw_frame(2, 2, |_, _| celsius_to_raw(25.0)));
        let mut cam = P2Pro::new(frames).with_retry_interval(Duration::ZERO);
        let frame = cam.capture().unwrap();
        assert!((frame.at(1, 1) - 25.0).abs() < 0.01);
        assert!(matches!(cam.capture(), Err(LabError::CaptureFailed(_))));
    }
    #[test]
    fn snapshot_layout_and_markers() {
        let mut frames = ManualFrames::default();
        frames.push(raw_frame(32, 24, |x, y| {
            celsius_to_raw(if (x, y) == (5, 7) { 90.0 } else if (x, y) == (30, 2) { -5.0 } else { 30.0 })
        }));
        let mut cam = P2Pro::new(frames);
        let snapshot = cam.snapshot(SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.image.dimensions(), (64 + SCALE_BAR_AREA, 48));
        let labels: Vec<&str> = snapshot.markers.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["min -5.0 °C", "max 90.0 °C", "30.0 °C"]);
        assert_eq!((snapshot.markers[1].x, snapshot.markers[1].y), (5, 7));
        // Far from any marker the pixel keeps its false color.
        let expected = cam.palette().color(snapshot.frame.at(20, 20));
        assert_eq!(*snapshot.image.get_pixel(40, 40), expected);
        // Bar rows run from 120 °C at y = 10 down to -20 °C over 28 rows.
        let t = 120.0 - 140.0 * 25.0 / 27.0;
        assert_eq!(*snapshot.image.get_pixel(64 + 5 + 2, 35), cam.palette().color(t));
        assert_ne!(cam.palette().color(t), Rgb([0, 0, 0]));
    }
    #[test]
    fn snapshot_without_decorations() {
        let mut frames = ManualFrames::default();
        frames.push(raw_frame(8, 6, |_, _| celsius_to_raw(40.0)));
        let options = SnapshotOptions {
            scale: false,
            min_point: false,
            max_point: false,
            center_point: false,
        };
        let snapshot = P2Pro::new(frames).snapshot(options).unwrap();
        assert_eq!(snapshot.image.dimensions(), (16, 12));
        assert!(snapshot.markers.is_empty());
        assert!(snapshot.image.pixels().all(|p| *p == Rgb([0, 255, 0])));
    }
}
