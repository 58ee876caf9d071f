use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};
use luxmeter_daq::actuator::NeoLights;
use luxmeter_daq::config::{check_strftime, Settings};
use luxmeter_daq::core::{format_lux, LuxSample};
use luxmeter_daq::error::AppResult;
use luxmeter_daq::instrument::discovery::{find_luxmeters, list_ports};
use luxmeter_daq::instrument::ut382::SampleStreamExt;
use luxmeter_daq::instrument::{ChromaMeter, Cl200aSession, LuxMeter, MeasurementSource, Ut382};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "luxmeter_daq")]
#[command(about = "Luxmeter acquisition for light calibration runs", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and their USB manufacturers
    Ports,

    /// Read the Konica Minolta CL-200A
    Cl200a {
        /// Serial port (default: configuration, then discovery)
        #[arg(short, long)]
        port: Option<String>,

        /// Number of readings
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        #[command(subcommand)]
        reading: Reading,
    },

    /// Stream the UNI-T UT382 as TSV until interrupted
    Ut382(Ut382Args),

    /// Show a brightness or color on the RGB light for a while
    Light {
        #[arg(short, long)]
        brightness: Option<u8>,

        /// Hex RGB color, e.g. FF8000
        #[arg(long)]
        color: Option<String>,

        /// Seconds to hold before switching off
        #[arg(long, default_value_t = 5)]
        hold: u64,
    },
}

#[derive(Subcommand)]
enum Reading {
    /// Illuminance
    Lux,
    /// Tristimulus values
    Xyz,
    /// Correlated color temperature
    Cct {
        /// Calculation method, repeatable (default: configuration)
        #[arg(short, long = "method")]
        methods: Vec<String>,
    },
    /// Illuminance, TCP and Δuv
    DeltaUv,
    /// Full sample as JSON
    Sample,
}

#[derive(Args)]
struct Ut382Args {
    /// Serial port (default: configuration, then discovery)
    #[arg(short, long)]
    port: Option<String>,

    /// Only output data when the measurement changes
    #[arg(long)]
    delta: bool,

    /// Average together N seconds of readings
    #[arg(long, value_name = "N")]
    moving_average: Option<u32>,

    /// Path to save TSV data to (default: stdout)
    #[arg(long)]
    file: Option<PathBuf>,

    /// chrono format string for timestamps
    #[arg(long)]
    strftime: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config).context("Failed to load configuration")?;
    init_logging(&settings.application.log_level, cli.verbose);
    info!("Starting {}", settings.application.name);

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping acquisition");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    // Serial I/O blocks; ports are dropped inside the task on every exit path
    let command = cli.command;
    tokio::task::spawn_blocking(move || run(command, &settings, stop))
        .await
        .context("Acquisition task panicked")?
}

fn init_logging(level: &str, verbose: u8) {
    let level = match verbose {
        0 => level,
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn run(command: Commands, settings: &Settings, stop: Arc<AtomicBool>) -> Result<()> {
    match command {
        Commands::Ports => print_ports(),
        Commands::Cl200a {
            port,
            count,
            reading,
        } => run_cl200a(port, count, &reading, settings, &stop),
        Commands::Ut382(args) => run_ut382(args, settings, stop),
        Commands::Light {
            brightness,
            color,
            hold,
        } => run_light(brightness, color.as_deref(), hold, settings, &stop),
    }
}

fn print_ports() -> Result<()> {
    for port in list_ports()? {
        println!(
            "{}\t{}\t{}",
            port.device,
            port.manufacturer.as_deref().unwrap_or("-"),
            port.product.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Explicit port, then configuration, then the first port from `manufacturer`.
fn resolve_port(
    explicit: Option<String>,
    configured: Option<&String>,
    manufacturer: &str,
) -> Result<String> {
    if let Some(port) = explicit.or_else(|| configured.cloned()) {
        return Ok(port);
    }
    let found = find_luxmeters(manufacturer)?;
    match found.as_slice() {
        [] => bail!("No luxmeters found (manufacturer '{}')", manufacturer),
        [only] => Ok(only.clone()),
        [first, ..] => {
            for (num, port) in found.iter().enumerate() {
                info!("{}) {}", num, port);
            }
            warn!("Several luxmeters found, using {} (pass --port to choose)", first);
            Ok(first.clone())
        }
    }
}

fn run_cl200a(
    port: Option<String>,
    count: u32,
    reading: &Reading,
    settings: &Settings,
    stop: &AtomicBool,
) -> Result<()> {
    let config = &settings.cl200a;
    let port = resolve_port(port, config.port.as_ref(), &config.manufacturer)?;
    let mut meter = Cl200aSession::open("cl200a", &port, config)
        .with_context(|| format!("Could not connect to luxmeter on {}", port))?;

    let methods = match reading {
        Reading::Cct { methods } if !methods.is_empty() => methods.clone(),
        _ => config.cct_methods.clone(),
    };
    let methods: Vec<&str> = methods.iter().map(String::as_str).collect();

    for _ in 0..count {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = match reading {
            Reading::Lux => meter.get_lux()?.map(|lux| lux.to_string()),
            Reading::Xyz => meter
                .get_xyz()?
                .map(|(x, y, z)| format!("{}\t{}\t{}", x, y, z)),
            Reading::Cct { .. } => meter.get_cct(&methods)?.map(|cct| {
                let values: Vec<String> = cct.values().iter().map(|v| v.to_string()).collect();
                methods
                    .iter()
                    .zip(values)
                    .map(|(method, value)| format!("{}: {} K", method, value))
                    .collect::<Vec<_>>()
                    .join("\t")
            }),
            Reading::DeltaUv => meter
                .get_delta_uv()?
                .map(|(lux, tcp, delta_uv)| format!("{}\t{}\t{}", lux, tcp, delta_uv)),
            Reading::Sample => meter
                .sample()?
                .map(|sample| serde_json::to_string(&sample))
                .transpose()?,
        };
        match line {
            Some(line) => println!("{}", line),
            None => debug!("No data from the CL-200A yet"),
        }
    }
    Ok(())
}

fn run_ut382(args: Ut382Args, settings: &Settings, stop: Arc<AtomicBool>) -> Result<()> {
    let config = &settings.ut382;
    let strftime = args.strftime.unwrap_or_else(|| config.strftime.clone());
    check_strftime(&strftime)?;
    let port = resolve_port(args.port, config.port.as_ref(), &config.manufacturer)?;

    let output: Box<dyn Write> = match &args.file {
        Some(path) if path.as_os_str() != "-" => Box::new(
            File::create(path).with_context(|| format!("Cannot create {}", path.display()))?,
        ),
        _ => Box::new(io::stdout()),
    };
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(output);
    writer.write_record(["time", "light", "unit"])?;
    writer.flush()?;

    let mut meter = Ut382::open("ut382", &port, config)
        .with_context(|| format!("Could not open UT382 on {}", port))?
        .with_stop_flag(stop);

    let mut stream: Box<dyn Iterator<Item = AppResult<LuxSample>> + '_> = Box::new(meter.monitor());
    if let Some(seconds) = args.moving_average {
        stream = Box::new(stream.moving_average(seconds));
    }
    if args.delta {
        stream = Box::new(stream.delta());
    }

    for sample in stream {
        let sample = sample.context("UT382 stream failed")?;
        let Some(lux) = sample.lux else {
            continue;
        };
        writer.write_record([
            sample.time.format(&strftime).to_string(),
            format_lux(lux, sample.fractional),
            sample.unit.label().to_string(),
        ])?;
        writer.flush()?;
    }
    Ok(())
}

fn run_light(
    brightness: Option<u8>,
    color: Option<&str>,
    hold: u64,
    settings: &Settings,
    stop: &AtomicBool,
) -> Result<()> {
    let config = settings
        .actuator
        .as_ref()
        .context("No [actuator] section in the configuration")?;
    let mut lights = NeoLights::open("lights", config)
        .with_context(|| format!("Could not open light controller on {}", config.port))?;
    if let Some(color) = color {
        lights.set_color(color)?;
    }
    if let Some(brightness) = brightness {
        lights.set_brightness(brightness)?;
    }
    println!("{:?}", lights.cache());

    let until = Instant::now() + Duration::from_secs(hold);
    while Instant::now() < until && !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}
