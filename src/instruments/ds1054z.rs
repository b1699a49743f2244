// src/instruments/ds1054z.rs
// Rigol DS1054Z oscilloscope over SCPI.
//
// Best transfer rates come from a raw socket (port 5555) with Nagle disabled,
// which is what `crate::port::StreamPort::tcp` sets up.
use std::thread;
use std::time::Duration;
use image::{DynamicImage, ImageFormat};
use log::{debug, info, warn};
use crate::error::LabError;
use crate::instruments::{verify_identity, WaveformScope};
use crate::port::{parse_number, InstrumentPort};
use crate::response::dft::{extract, ToneReading};
pub const TIMEBASES: [f64; 32] = [
    2e-9, 5e-9, //
    1e-8, 2e-8, 5e-8, //
    1e-7, 2e-7, 5e-7, //
    1e-6, 2e-6, 5e-6, //
    1e-5, 2e-5, 5e-5, //
    1e-4, 2e-4, 5e-4, //
    1e-3, 2e-3, 5e-3, //
    1e-2, 2e-2, 5e-2, //
    1e-1, 2e-1, 5e-1, //
    1e0, 2e0, 5e0, //
    1e1, 2e1, 5e1,
];
pub const VERTICAL_SCALES: [f64; 13] = [
    1e-2, 2e-2, 5e-2, //
    1e-1, 2e-1, 5e-1, //
    1e0, 2e0, 5e0, //
    1e1, 2e1, 5e1, //
    1e2,
];
/// Items accepted by `MEAS:ITEM?`.
pub const MEASUREMENT_ITEMS: [&str; 37] = [
    "VMAX", "VMIN", "VPP", "VTOP", "BASE", "VAMP", "VAVG", "VRMS", "OVERSHOOT", "PRESHOOT",
    "MAREA", "MPAREA", "PERIOD", "FREQUENCY", "RTIME", "FTIME", "PWIDTH", "NWIDTH", "PDUTY",
    "NDUTY", "RDELAY", "FDELAY", "RPHASE", "FPHASE", "TVMAX", "TVMIN", "PSLEWRATE", "NSLEWRATE",
    "VUPPER", "VMID", "VLOWER", "VARIANCE", "PVRMS", "PPULSES", "NPULSES", "PEDGES", "NEDGES",
];
const SCREEN_POINTS: usize = 1200;
const RAW_BLOCK_LEN: usize = 250_000;
const POLL_ATTEMPTS: usize = 20;
const HORIZONTAL_DIVISIONS: f64 = 12.0;
/// Pick the table entry closest to `value`.
pub fn nearest(table: &[f64], value: f64) -> f64 {
    table
        .iter()
        .copied()
        .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
        .unwrap_or(value)
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelConfig {
    pub scale: f64,
    pub ac_coupling: bool,
    pub probe_ratio: u32,
    /// 20 MHz bandwidth limit.
    pub bandwidth_limit: bool,
    pub display: bool,
}
impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            ac_coupling: false,
            probe_ratio: 10,
            bandwidth_limit: false,
            display: true,
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slope {
    Rising,
    Falling,
}
/// Which capture memory to read waveforms from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Buffer {
    /// The 1200 points shown on screen.
    Screen,
    /// The whole acquisition memory. Stops acquisition.
    Raw,
}
struct SampleFormat {
    increment: f64,
    origin: f64,
    reference: f64,
}
impl SampleFormat {
    fn volts(&self, raw: &[u8]) -> Vec<f64> {
        raw.iter()
            .map(|&b| (f64::from(b) - self.reference - self.origin) * self.increment)
            .collect()
    }
}
pub struct Ds1054z<P> {
    port: P,
    identity: String,
    poll_interval: Duration,
}
impl<P: InstrumentPort> Ds1054z<P> {
    pub fn connect(mut port: P) -> Result<Self, LabError> {
        let identity = verify_identity(&mut port, "RIGOL")?;
        Ok(Self {
            port,
            identity,
            poll_interval: Duration::from_millis(500),
        })
    }
    /// Delay between status polls in [`Self::autoscale`] and [`Self::wait_stopped`].
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
    pub fn identity(&self) -> &str {
        &self.identity
    }
    pub fn port(&self) -> &P {
        &self.port
    }
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
    fn check_channel(channel: u8) -> Result<u8, LabError> {
        if (1..=4).contains(&channel) {
            Ok(channel)
        } else {
            Err(LabError::InvalidParameter(format!(
                "DS1054Z has channels 1-4, not {channel}"
            )))
        }
    }
    fn query_number(&mut self, command: &str) -> Result<f64, LabError> {
        let response = self.port.query(command)?;
        parse_number(&self.port, &response)
    }
    /// Seconds per division. With `round` the nearest supported setting is used.
    pub fn set_timebase(&mut self, seconds: f64, round: bool) -> Result<(), LabError> {
        let seconds = if round { nearest(&TIMEBASES, seconds) } else { seconds };
        self.port.write(&format!("TIM:SCAL {seconds}"))
    }
    pub fn config_channel(&mut self, channel: u8, config: ChannelConfig) -> Result<(), LabError> {
        let ch = Self::check_channel(channel)?;
        let coupling = if config.ac_coupling { "AC" } else { "DC" };
        let display = if config.display { "ON" } else { "OFF" };
        let bwlimit = if config.bandwidth_limit { "20M" } else { "OFF" };
        self.port.write(&format!("CHAN{ch}:COUP {coupling}"))?;
        self.port.write(&format!("CHAN{ch}:DISP {display}"))?;
        self.port.write(&format!("CHAN{ch}:PROB {}", config.probe_ratio))?;
        self.port.write(&format!("CHAN{ch}:BWLIMIT {bwlimit}"))?;
        self.port.write(&format!("CHAN{ch}:SCAL {}", config.scale))
    }
    /// Volts per division. With `round` the nearest supported setting is used.
    pub fn set_channel_scale(&mut self, channel: u8, scale: f64, round: bool) -> Result<(), LabError> {
        let ch = Self::check_channel(channel)?;
        let scale = if round { nearest(&VERTICAL_SCALES, scale) } else { scale };
        self.port.write(&format!("CHAN{ch}:SCAL {scale}"))
    }
    /// Run the built-in autoscale and wait for it to finish.
    pub fn autoscale(&mut self) -> Result<(), LabError> {
        self.port.write("AUTOSCALE")?;
        let mut complete = false;
        for _ in 0..POLL_ATTEMPTS {
            if self.port.query("*OPC?")?.contains('1') {
                complete = true;
                break;
            }
            thread::sleep(self.poll_interval);
        }
        if !complete {
            warn!("{}: autoscale still busy, continuing", self.port.name());
        }
        thread::sleep(self.poll_interval * 2);
        Ok(())
    }
    pub fn run(&mut self) -> Result<(), LabError> {
        self.port.write("RUN")
    }
    pub fn single(&mut self) -> Result<(), LabError> {
        self.port.write("SINGLE")
    }
    pub fn stop(&mut self) -> Result<(), LabError> {
        self.port.write("STOP")
    }
    pub fn force_trigger(&mut self) -> Result<(), LabError> {
        self.port.write("TFORCE")
    }
    /// Poll the trigger status until the scope reports STOP. Returns whether it did.
    pub fn wait_stopped(&mut self) -> Result<bool, LabError> {
        for _ in 0..POLL_ATTEMPTS {
            if self.port.query("TRIG:STAT?")?.contains("STOP") {
                return Ok(true);
            }
            thread::sleep(self.poll_interval);
        }
        Ok(false)
    }
    pub fn acquire_normal(&mut self) -> Result<(), LabError> {
        self.port.write("ACQ:TYPE NORM")
    }
    pub fn acquire_average(&mut self, averages: u32) -> Result<(), LabError> {
        if !averages.is_power_of_two() || !(2..=1024).contains(&averages) {
            return Err(LabError::InvalidParameter(format!(
                "averages must be a power of two from 2 to 1024, got {averages}"
            )));
        }
        self.port.write("ACQ:TYPE AVER")?;
        self.port.write(&format!("ACQ:AVER {averages}"))
    }
    pub fn set_trigger(&mut self, channel: u8, slope: Slope, level: f64) -> Result<(), LabError> {
        let ch = Self::check_channel(channel)?;
        let slope = match slope {
            Slope::Rising => "POS",
            Slope::Falling => "NEG",
        };
        self.port.write(&format!("TRIG:EDGE:SOUR CHAN{ch}"))?;
        self.port.write(&format!("TRIG:EDGE:SLOP {slope}"))?;
        self.port.write(&format!("TRIG:EDGE:LEV {level:.6}"))
    }
    /// One of [`MEASUREMENT_ITEMS`] on `channel`.
    pub fn measure(&mut self, channel: u8, item: &str) -> Result<f64, LabError> {
        let ch = Self::check_channel(channel)?;
        let item = item.to_ascii_uppercase();
        if !MEASUREMENT_ITEMS.contains(&item.as_str()) {
            return Err(LabError::InvalidParameter(format!(
                "unknown measurement item {item}"
            )));
        }
        self.query_number(&format!("MEAS:ITEM? {item},CHAN{ch}"))
    }
    /// Rising edge delay from `first` to `second`, seconds.
    pub fn measure_rdelay(&mut self, first: u8, second: u8) -> Result<f64, LabError> {
        let a = Self::check_channel(first)?;
        let b = Self::check_channel(second)?;
        self.query_number(&format!("MEAS:ITEM? RDELAY,CHAN{a},CHAN{b}"))
    }
    pub fn screenshot(&mut self) -> Result<DynamicImage, LabError> {
        let png = self.port.query_binary("DISP:DATA? ON,OFF,PNG")?;
        info!("{}: screenshot, {} bytes", self.port.name(), png.len());
        Ok(image::load_from_memory_with_format(&png, ImageFormat::Png)?)
    }
    /// `None` selects automatic memory depth.
    pub fn set_memdepth(&mut self, depth: Option<u32>) -> Result<(), LabError> {
        match depth {
            Some(depth) if depth > 0 => self.port.write(&format!("ACQ:MDEPTH {depth}")),
            _ => self.port.write("ACQ:MDEPTH AUTO"),
        }
    }
    /// Points in acquisition memory. In automatic mode the scope only answers
    /// `AUTO`, so the depth is sample rate times the 12-division capture window.
    pub fn memory_depth(&mut self) -> Result<usize, LabError> {
        let response = self.port.query("ACQ:MDEPTH?")?;
        if response.eq_ignore_ascii_case("AUTO") {
            let rate = self.query_number("ACQ:SRAT?")?;
            let timebase = self.query_number("TIM:SCAL?")?;
            let depth = (rate * timebase * HORIZONTAL_DIVISIONS).round();
            debug!("{}: automatic memory depth is {depth} points", self.port.name());
            return Ok(depth as usize);
        }
        Ok(parse_number(&self.port, &response)? as usize)
    }
    /// Seconds between samples of the current capture.
    pub fn sample_interval(&mut self) -> Result<f64, LabError> {
        self.query_number("WAV:XINC?")
    }
    fn sample_format(&mut self) -> Result<SampleFormat, LabError> {
        Ok(SampleFormat {
            increment: self.query_number("WAV:YINC?")?,
            origin: self.query_number("WAV:YOR?")?,
            reference: self.query_number("WAV:YREF?")?,
        })
    }
    /// Screen buffer of `channel` in volts.
    pub fn fetch_data(&mut self, channel: u8) -> Result<Vec<f64>, LabError> {
        let ch = Self::check_channel(channel)?;
        self.port.write(&format!("WAV:SOUR CHAN{ch}"))?;
        self.port.write("WAV:MODE NORM")?;
        self.port.write("WAV:FORM BYTE")?;
        self.port.write("WAV:STAR 1")?;
        self.port.write(&format!("WAV:STOP {SCREEN_POINTS}"))?;
        let format = self.sample_format()?;
        let raw = self.port.query_binary("WAV:DATA?")?;
        Ok(format.volts(&raw))
    }
    /// Points `start..=end` (1-based) of the acquisition memory, in volts.
    /// `end` defaults to the current memory depth. Stops acquisition.
    pub fn fetch_data_raw(
        &mut self,
        channel: u8,
        start: usize,
        end: Option<usize>,
    ) -> Result<Vec<f64>, LabError> {
        let ch = Self::check_channel(channel)?;
        self.port.write("STOP")?;
        self.port.write(&format!("WAV:SOUR CHAN{ch}"))?;
        self.port.write("WAV:MODE RAW")?;
        self.port.write("WAV:FORM BYTE")?;
        let format = self.sample_format()?;
        let end = match end {
            Some(end) => end,
            None => self.memory_depth()?,
        };
        let start = start.max(1);
        let mut raw = Vec::with_capacity(end.saturating_sub(start) + 1);
        let mut block_start = start;
        while block_start <= end {
            let block_end = (block_start + RAW_BLOCK_LEN - 1).min(end);
            self.port.write(&format!("WAV:STAR {block_start}"))?;
            self.port.write(&format!("WAV:STOP {block_end}"))?;
            raw.extend(self.port.query_binary("WAV:DATA?")?);
            block_start = block_end + 1;
        }
        debug!(
            "{}: fetched {} raw samples from CHAN{ch}",
            self.port.name(),
            raw.len()
        );
        Ok(format.volts(&raw))
    }
    /// Amplitude (Vpp) and phase of `freq` on `channel`.
    pub fn dft_at_freq(&mut self, channel: u8, freq: f64, buffer: Buffer) -> Result<ToneReading, LabError> {
        let data = match buffer {
            Buffer::Screen => self.fetch_data(channel)?,
            Buffer::Raw => self.fetch_data_raw(channel, 1, None)?,
        };
        let dt = self.sample_interval()?;
        extract(&data, dt, freq)
    }
}
impl<P: InstrumentPort> WaveformScope for Ds1054z<P> {
    fn run(&mut self) -> Result<(), LabError> {
        Ds1054z::run(self)
    }
    fn stop(&mut self) -> Result<(), LabError> {
        Ds1054z::stop(self)
    }
    fn force_trigger(&mut self) -> Result<(), LabError> {
        Ds1054z::force_trigger(self)
    }
    fn set_timebase(&mut self, seconds_per_div: f64) -> Result<(), LabError> {
        Ds1054z::set_timebase(self, seconds_per_div, true)
    }
    fn set_channel_scale(&mut self, channel: u8, volts_per_div: f64) -> Result<(), LabError> {
        Ds1054z::set_channel_scale(self, channel, volts_per_div, true)
    }
    fn set_memdepth(&mut self, depth: Option<u32>) -> Result<(), LabError> {
        Ds1054z::set_memdepth(self, depth)
    }
    fn sample_interval(&mut self) -> Result<f64, LabError> {
        Ds1054z::sample_interval(self)
    }
    fn fetch_waveform(&mut self, channel: u8) -> Result<Vec<f64>, LabError> {
        self.fetch_data_raw(channel, 1, None)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ScriptedPort;
    const IDN: &str = "RIGOL TECHNOLOGIES,DS1104Z,DS1ZA000000001,00.04.04.SP3";
    /// Port that answers the identity query before any scripted reply.
    fn identified() -> ScriptedPort {
        ScriptedPort::scripted("scope").reply(IDN)
    }
    fn scope(port: ScriptedPort) -> Ds1054z<ScriptedPort> {
        Ds1054z::connect(port)
            .unwrap()
            .with_poll_interval(Duration::ZERO)
    }
    fn sent(scope: &Ds1054z<ScriptedPort>) -> Vec<String> {
        scope.port().sent().into_iter().skip(1).collect()
    }
    #[test]
    fn rejects_other_instruments() {
        let port = ScriptedPort::scripted("scope").reply("Siglent,SDS1202X-E");
        assert!(matches!(
            Ds1054z::connect(port),
            Err(LabError::UnexpectedIdentity { .. })
        ));
    }
    #[test]
    fn settings_round_to_supported_values() {
        let mut s = scope(identified());
        s.set_timebase(1.0 / 3_000.0, true).unwrap();
        s.set_timebase(3e-4, false).unwrap();
        s.set_channel_scale(2, 0.3, true).unwrap();
        s.set_channel_scale(2, 0.0071, true).unwrap();
        assert_eq!(
            sent(&s),
            ["TIM:SCAL 0.0002", "TIM:SCAL 0.0003", "CHAN2:SCAL 0.2", "CHAN2:SCAL 0.01"]
        );
        assert!(s.set_channel_scale(5, 1.0, true).is_err());
    }
    #[test]
    fn channel_configuration() {
        let mut s = scope(identified());
        let config = ChannelConfig {
            scale: 0.5,
            ac_coupling: true,
            bandwidth_limit: true,
            ..ChannelConfig::default()
        };
        s.config_channel(3, config).unwrap();
        assert_eq!(
            sent(&s),
            [
                "CHAN3:COUP AC",
                "CHAN3:DISP ON",
                "CHAN3:PROB 10",
                "CHAN3:BWLIMIT 20M",
                "CHAN3:SCAL 0.5"
            ]
        );
    }
    #[test]
    fn autoscale_polls_until_complete() {
        let port = identified().reply("0").reply("0").reply("1");
        let mut s = scope(port);
        s.autoscale().unwrap();
        assert_eq!(sent(&s), ["AUTOSCALE", "*OPC?", "*OPC?", "*OPC?"]);
    }
    #[test]
    fn wait_stopped_gives_up() {
        let mut port = identified();
        for _ in 0..POLL_ATTEMPTS {
            port = port.reply("WAIT");
        }
        let mut s = scope(port);
        assert!(!s.wait_stopped().unwrap());
        let mut s = scope(identified().reply("TD").reply("STOP"));
        assert!(s.wait_stopped().unwrap());
    }
    #[test]
    fn triggers_and_measurements() {
        let port = identified().reply("1.000000e+03").reply("2.5e-04");
        let mut s = scope(port);
        s.set_trigger(1, Slope::Falling, 0.25).unwrap();
        assert_eq!(s.measure(1, "frequency").unwrap(), 1_000.0);
        assert_eq!(s.measure_rdelay(1, 2).unwrap(), 2.5e-4);
        assert!(matches!(
            s.measure(1, "BOGUS"),
            Err(LabError::InvalidParameter(_))
        ));
        assert_eq!(
            sent(&s),
            [
                "TRIG:EDGE:SOUR CHAN1",
                "TRIG:EDGE:SLOP NEG",
                "TRIG:EDGE:LEV 0.250000",
                "MEAS:ITEM? FREQUENCY,CHAN1",
                "MEAS:ITEM? RDELAY,CHAN1,CHAN2"
            ]
        );
    }
    #[test]
    fn acquisition_modes() {
        let mut s = scope(identified());
        s.acquire_average(128).unwrap();
        s.acquire_normal().unwrap();
        s.set_memdepth(None).unwrap();
        s.set_memdepth(Some(120_000)).unwrap();
        assert!(s.acquire_average(100).is_err());
        assert_eq!(
            sent(&s),
            [
                "ACQ:TYPE AVER",
                "ACQ:AVER 128",
                "ACQ:TYPE NORM",
                "ACQ:MDEPTH AUTO",
                "ACQ:MDEPTH 120000"
            ]
        );
    }
    #[test]
    fn screen_data_is_scaled() {
        let port = identified()
            .reply("0.04")
            .reply("-2")
            .reply("127")
            .reply_block(&[125, 127, 150]);
        let mut s = scope(port);
        let volts = s.fetch_data(1).unwrap();
        assert_eq!(volts.len(), 3);
        for (v, expected) in volts.iter().zip([0.0, 0.08, 1.0]) {
            assert!((v - expected).abs() < 1e-12, "{volts:?}");
        }
        assert_eq!(
            sent(&s),
            [
                "WAV:SOUR CHAN1",
                "WAV:MODE NORM",
                "WAV:FORM BYTE",
                "WAV:STAR 1",
                "WAV:STOP 1200",
                "WAV:YINC?",
                "WAV:YOR?",
                "WAV:YREF?",
                "WAV:DATA?"
            ]
        );
    }
    #[test]
    fn raw_data_is_read_in_blocks() {
        let depth = RAW_BLOCK_LEN + 10;
        let port = identified()
            .reply("1")
            .reply("0")
            .reply("0")
            .reply(&depth.to_string())
            .reply_block(&vec![1u8; RAW_BLOCK_LEN])
            .reply_block(&[2u8; 10]);
        let mut s = scope(port);
        let volts = s.fetch_data_raw(2, 1, None).unwrap();
        assert_eq!(volts.len(), depth);
        assert_eq!(volts[RAW_BLOCK_LEN - 1], 1.0);
        assert_eq!(volts[RAW_BLOCK_LEN], 2.0);
        let commands = sent(&s);
        assert_eq!(&commands[..4], ["STOP", "WAV:SOUR CHAN2", "WAV:MODE RAW", "WAV:FORM BYTE"]);
        assert_eq!(
            &commands[8..],
            [
                "WAV:STAR 1",
                "WAV:STOP 250000",
                "WAV:DATA?",
                "WAV:STAR 250001",
                "WAV:STOP 250010",
                "WAV:DATA?"
            ]
        );
    }
    #[test]
    fn automatic_depth_is_derived_from_sample_rate() {
        let port = identified()
            .reply("0.5")
            .reply("0")
            .reply("0")
            .reply("AUTO")
            .reply("1.000000e+07")
            .reply("5.000000e-06")
            .reply_block(&[2u8; 600]);
        let mut s = scope(port);
        let volts = s.fetch_waveform(1).unwrap();
        assert_eq!(volts.len(), 600);
        assert_eq!(volts[0], 1.0);
        let commands = sent(&s);
        assert_eq!(
            &commands[7..],
            [
                "ACQ:MDEPTH?",
                "ACQ:SRAT?",
                "TIM:SCAL?",
                "WAV:STAR 1",
                "WAV:STOP 600",
                "WAV:DATA?"
            ]
        );
        let mut s = scope(identified().reply("120000"));
        assert_eq!(s.memory_depth().unwrap(), 120_000);
    }
    #[test]
    fn dft_on_screen_buffer() {
        // 1200 points, 20 samples per period of a 1 kHz tone, 2 Vpp.
        let samples: Vec<u8> = (0..SCREEN_POINTS)
            .map(|i| {
                let v = (std::f64::consts::TAU * i as f64 / 20.0).cos();
                (128.0 + v * 100.0).round() as u8
            })
            .collect();
        let port = identified()
            .reply("0.01")
            .reply("0")
            .reply("128")
            .reply_block(&samples)
            .reply("5e-05");
        let mut s = scope(port);
        let tone = s.dft_at_freq(1, 1_000.0, Buffer::Screen).unwrap();
        assert!((tone.amplitude - 2.0).abs() < 5e-3, "{tone:?}");
        assert!(tone.phase_deg.abs() < 0.1);
    }
    #[test]
    fn screenshot_must_be_png() {
        let port = identified().reply_block(b"not an image");
        let mut s = scope(port);
        assert!(matches!(s.screenshot(), Err(LabError::Plot(_))));
    }
}
