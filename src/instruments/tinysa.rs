// src/instruments/tinysa.rs
// tinySA spectrum analyzer over its USB serial shell.
//
// The shell echoes every command, prints its output and finishes with a
// `ch> ` prompt that is not followed by a newline.
use image::{Rgba, RgbaImage};
use log::{debug, info};
use crate::error::LabError;
use crate::port::InstrumentPort;
pub const SCREEN_WIDTH: u32 = 480;
pub const SCREEN_HEIGHT: u32 = 320;
/// Resolution bandwidths the firmware accepts, Hz.
pub const RBW_CHOICES: [f64; 9] = [200.0, 1e3, 3e3, 10e3, 30e3, 100e3, 300e3, 600e3, 850e3];
const SEGMENT_POINTS: usize = 200;
const PROMPT: &[u8] = b"ch>";
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanRequest {
    pub start: f64,
    pub stop: f64,
    pub rbw: f64,
    /// Point spacing as a fraction of `rbw`.
    pub step: f64,
    pub logscale: bool,
}
impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            start: 1e6,
            stop: 100e6,
            rbw: 850e3,
            step: 0.5,
            logscale: false,
        }
    }
}
impl ScanRequest {
    /// Frequencies to measure, endpoints included.
    pub fn frequencies(&self) -> Result<Vec<f64>, LabError> {
        if !RBW_CHOICES.contains(&self.rbw) {
            return Err(LabError::InvalidParameter(format!(
                "RBW {} Hz is not one of {RBW_CHOICES:?}",
                self.rbw
            )));
        }
        if !(self.stop > self.start) || !(self.start >= 0.0) {
            return Err(LabError::InvalidParameter(format!(
                "scan needs 0 <= start < stop, got {}..{}",
                self.start, self.stop
            )));
        }
        if !(self.step > 0.0) {
            return Err(LabError::InvalidParameter("scan step must be positive".into()));
        }
        if self.logscale && self.start <= 0.0 {
            return Err(LabError::InvalidParameter(
                "logarithmic scan needs a positive start".into(),
            ));
        }
        let points = ((self.stop - self.start) / (self.step * self.rbw)).ceil() as usize;
        let points = points.max(2);
        let span = (points - 1) as f64;
        Ok((0..points)
            .map(|i| {
                let t = i as f64 / span;
                if self.logscale {
                    let (lo, hi) = (self.start.log10(), self.stop.log10());
                    10f64.powf(lo + (hi - lo) * t)
                } else {
                    self.start + (self.stop - self.start) * t
                }
            })
            .collect())
    }
}
/// RGB565 big-endian pixel to opaque RGBA.
fn rgb565(hi: u8, lo: u8) -> Rgba<u8> {
    let v = u16::from_be_bytes([hi, lo]);
    let r = ((v >> 8) & 0xF8) as u8;
    let g = ((v >> 3) & 0xFC) as u8;
    let b = ((v << 3) & 0xF8) as u8;
    Rgba([r, g, b, 0xFF])
}
pub struct TinySa<P> {
    port: P,
    identity: String,
}
impl<P: InstrumentPort> TinySa<P> {
    pub fn connect(mut port: P) -> Result<Self, LabError> {
        let lines = run(&mut port, "info")?;
        let identity = lines
            .iter()
            .find(|line| line.contains("tinySA"))
            .cloned()
            .ok_or_else(|| LabError::UnexpectedIdentity {
                expected: "tinySA".to_string(),
                response: lines.join("\n"),
            })?;
        info!("{}: connected to {identity}", port.name());
        Ok(Self { port, identity })
    }
    pub fn identity(&self) -> &str {
        &self.identity
    }
    pub fn port(&self) -> &P {
        &self.port
    }
    /// Run a shell command and return its output lines.
    pub fn run_command(&mut self, command: &str) -> Result<Vec<String>, LabError> {
        run(&mut self.port, command)
    }
    pub fn screenshot(&mut self) -> Result<RgbaImage, LabError> {
        self.port.write("capture")?;
        self.port.read_line()?;
        let len = (SCREEN_WIDTH * SCREEN_HEIGHT * 2) as usize;
        let data = self.port.read_exact(len)?;
        let mut image = RgbaImage::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        for (pixel, bytes) in image.pixels_mut().zip(data.chunks_exact(2)) {
            *pixel = rgb565(bytes[0], bytes[1]);
        }
        Ok(image)
    }
    /// Measure level in dBm across the requested range, as `(frequency, dBm)`
    /// pairs. Long scans are split into segments of at most 200 points.
    pub fn scan(&mut self, request: &ScanRequest) -> Result<Vec<(f64, f64)>, LabError> {
        let frequencies = request.frequencies()?;
        let mut results = Vec::with_capacity(frequencies.len());
        for segment in frequencies.chunks(SEGMENT_POINTS) {
            let (first, last) = (segment[0], segment[segment.len() - 1]);
            let command = format!(
                "scan {} {} {} 3",
                first.trunc() as u64,
                last.trunc() as u64,
                segment.len()
            );
            debug!("{}: {command}", self.port.name());
            for line in self.run_command(&command)? {
                let mut fields = line.split_whitespace().map(str::parse::<f64>);
                match (fields.next(), fields.next()) {
                    (Some(Ok(freq)), Some(Ok(level))) => results.push((freq, level)),
                    (None, _) => {}
                    _ => {
                        return Err(LabError::protocol(
                            self.port.name(),
                            format!("bad scan line {line:?}"),
                        ))
                    }
                }
            }
        }
        Ok(results)
    }
}
/// Send `command`, skip its echo, and collect lines up to and including the prompt.
fn run<P: InstrumentPort>(port: &mut P, command: &str) -> Result<Vec<String>, LabError> {
    port.write(command)?;
    port.read_line()?;
    let mut lines = Vec::new();
    let mut current = Vec::new();
    loop {
        let byte = port.read_exact(1)?[0];
        if byte == b'\n' {
            let line = String::from_utf8_lossy(&current);
            lines.push(line.trim_end_matches('\r').to_string());
            current.clear();
            continue;
        }
        current.push(byte);
        if current.starts_with(PROMPT) {
            // The prompt ends with a single space.
            port.read_exact(1)?;
            return Ok(lines);
        }
    }
}
