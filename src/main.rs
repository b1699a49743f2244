// src/main.rs
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use labtools::config::BenchConfig;
use labtools::instruments::relaymux::parse_state;
use labtools::instruments::tinysa::ScanRequest;
use labtools::instruments::{Bench, Ds1054z, Et5410, Jds6600, P4603, RelayMux, TinySa};
use labtools::response::table::TABLE_HEADER;
use labtools::response::{
    render_bode_png, FrequencyPlan, Measurement, MeasurementSettings, PlotStyle,
    ScopeMeasurement, SimulatedBench, Sweep, SweepTable,
};
#[derive(Parser)]
#[command(name = "labtools")]
#[command(about = "Bench instrument utilities and frequency response sweeps", long_about = None)]
struct Cli {
    /// JSON file describing instrument addresses and measurement defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}
#[derive(Subcommand)]
enum Command {
    /// Measure gain and phase between scope channels 1 and 2 over a frequency range
    Freqresp(FreqrespArgs),
    /// Save the oscilloscope screen as PNG
    ScopeScreenshot { file: PathBuf },
    /// tinySA spectrum analyzer screenshot and scans
    Tinysa(TinySaArgs),
    /// Read the relay state, or set it from a decimal/0x/0b mask
    Relay { state: Option<String> },
    /// Print voltage and current once per second
    Monitor {
        #[arg(value_enum)]
        instrument: Monitored,
        /// Stop after this many readings
        #[arg(long)]
        count: Option<u64>,
    },
}
#[derive(Args)]
struct FreqrespArgs {
    #[arg(long, default_value = "100")]
    freq_min: f64,
    #[arg(long, default_value = "100000")]
    freq_max: f64,
    /// Points per decade of a logarithmic sweep
    #[arg(long, default_value = "10")]
    log_stepsdec: u32,
    /// Linear sweep with this spacing in Hz instead of a logarithmic one
    #[arg(long)]
    lin_interval: Option<f64>,
    /// Base settle time after triggering, seconds
    #[arg(long)]
    delay: Option<f64>,
    /// Rescale both channels before every measurement
    #[arg(long)]
    autorange: bool,
    /// Scope memory depth in points, 0 for automatic
    #[arg(long)]
    memdepth: Option<u32>,
    /// Print one JSON object per row instead of the text table
    #[arg(long)]
    json: bool,
    /// Also write a Bode plot PNG
    #[arg(long, value_name = "FILE")]
    plot: Option<PathBuf>,
    /// Measure a simulated RC low-pass with this corner frequency instead of hardware
    #[arg(long, value_name = "CUTOFF_HZ")]
    simulate_rc: Option<f64>,
}
#[derive(Args)]
struct TinySaArgs {
    #[arg(long, value_name = "FILE")]
    screenshot: Option<PathBuf>,
    /// Write `frequency dBm` lines to FILE
    #[arg(long, value_name = "FILE")]
    scan: Option<PathBuf>,
    #[arg(long, default_value = "1e6")]
    start: f64,
    #[arg(long, default_value = "900e6")]
    stop: f64,
    #[arg(long, default_value = "850e3")]
    rbw: f64,
    #[arg(long)]
    logscale: bool,
}
#[derive(Clone, Copy, ValueEnum)]
enum Monitored {
    Psu,
    Load,
}
fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    match cli.command {
        Command::Freqresp(args) => freqresp(&config, args),
        Command::ScopeScreenshot { file } => scope_screenshot(&config, &file),
        Command::Tinysa(args) => tinysa(&config, args),
        Command::Relay { state } => relay(&config, state.as_deref()),
        Command::Monitor { instrument, count } => monitor(&config, instrument, count),
    }
}
fn freqresp(config: &BenchConfig, args: FreqrespArgs) -> Result<()> {
    let mut settings = config.measurement.clone();
    if let Some(delay) = args.delay {
        settings.delay = Duration::try_from_secs_f64(delay)
            .with_context(|| format!("invalid delay {delay}"))?;
    }
    settings.autorange |= args.autorange;
    if let Some(depth) = args.memdepth {
        settings.memdepth = (depth > 0).then_some(depth);
    }
    let plan = FrequencyPlan::from_options(
        args.freq_min,
        args.freq_max,
        args.log_stepsdec,
        args.lin_interval,
    );
    if let Some(cutoff) = args.simulate_rc {
        info!("simulating an RC low-pass with a {cutoff} Hz corner");
        let simulated = MeasurementSettings {
            delay: Duration::ZERO,
            settle_periods: 0.0,
            ..settings
        };
        let bench = SimulatedBench::rc_lowpass(cutoff, 2.0);
        return run_sweep(&plan, ScopeMeasurement::new(bench, simulated), &args);
    }
    let scope = Ds1054z::connect(config.scope.open(config.scope_timeout())?)?;
    let generator_port = config
        .generator
        .open(config.serial_timeout())?
        .with_write_termination("\r\n");
    let generator = Jds6600::connect(generator_port)?;
    let bench = Bench { generator, scope };
    run_sweep(&plan, ScopeMeasurement::new(bench, settings), &args)
}
/// Print rows as they arrive so a failed sweep still leaves its partial output.
fn run_sweep<M: Measurement>(plan: &FrequencyPlan, measurement: M, args: &FreqrespArgs) -> Result<()> {
    let sweep = Sweep::new(plan, measurement)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if !args.json {
        writeln!(out, "{TABLE_HEADER}")?;
    }
    let mut table = SweepTable::default();
    let mut failure = None;
    for result in sweep {
        match result {
            Ok(row) => {
                if args.json {
                    writeln!(out, "{}", serde_json::to_string(&row)?)?;
                } else {
                    writeln!(out, "{}", row.format_line())?;
                }
                out.flush()?;
                table.push(row);
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }
    if let Some(path) = &args.plot {
        if !table.is_empty() {
            let png = render_bode_png(&table, PlotStyle::default())?;
            fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
        }
    }
    match failure {
        Some(err) => {
            Err(anyhow::Error::new(err).context(format!("sweep stopped after {} points", table.len())))
        }
        None => Ok(()),
    }
}
fn scope_screenshot(config: &BenchConfig, file: &Path) -> Result<()> {
    let mut scope = Ds1054z::connect(config.scope.open(config.scope_timeout())?)?;
    scope
        .screenshot()?
        .save(file)
        .with_context(|| format!("writing {}", file.display()))?;
    Ok(())
}
fn tinysa(config: &BenchConfig, args: TinySaArgs) -> Result<()> {
    let port = config
        .tinysa
        .open(config.serial_timeout())?
        .with_write_termination("\r\n");
    let mut analyzer = TinySa::connect(port)?;
    if let Some(path) = &args.screenshot {
        analyzer
            .screenshot()?
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &args.scan {
        let request = ScanRequest {
            start: args.start,
            stop: args.stop,
            rbw: args.rbw,
            logscale: args.logscale,
            ..ScanRequest::default()
        };
        let mut text = String::new();
        for (freq, dbm) in analyzer.scan(&request)? {
            text.push_str(&format!("{freq:.6e} {dbm:.6e}\n"));
        }
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
fn relay(config: &BenchConfig, state: Option<&str>) -> Result<()> {
    let mut mux = RelayMux::connect(config.relay_mux.open(config.serial_timeout())?)?;
    match state {
        Some(state) => mux.set(parse_state(state)?)?,
        None => println!("{:#x}", mux.get()?),
    }
    Ok(())
}
fn monitor(config: &BenchConfig, instrument: Monitored, count: Option<u64>) -> Result<()> {
    let timeout = config.serial_timeout();
    let mut read: Box<dyn FnMut() -> Result<(f64, f64)>> = match instrument {
        Monitored::Psu => {
            let mut psu = P4603::connect(config.psu.open(timeout)?)?;
            Box::new(move || Ok((psu.measure_voltage()?, psu.measure_current()?)))
        }
        Monitored::Load => {
            let mut load = Et5410::connect(config.load.open(timeout)?)?;
            Box::new(move || Ok((load.measure_voltage()?, load.measure_current()?)))
        }
    };
    let mut taken = 0;
    while count.map_or(true, |n| taken < n) {
        let (volts, amps) = read()?;
        println!("{volts:6.3} V, {amps:6.3} A");
        taken += 1;
        if count.map_or(true, |n| taken < n) {
            thread::sleep(Duration::from_secs(1));
        }
    }
    Ok(())
}
