//! Serial Capture - Main Entry Point
//!
//! Headless front end: lists ports, validates packet configs, parses
//! recorded streams and runs live captures.

mod cli;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use cli::{CaptureArgs, Cli, Command, ParseArgs, ValidateArgs};
use serial_capture::{
    config::{AppConfig, PacketFormat},
    serial::{list_ports, ScriptedTransport, SerialPortTransport, SerialTransport},
    CaptureSession, FrameParser, PacketConfig, PacketStore,
};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Bytes per scripted read in `--mock` mode
const MOCK_CHUNK_SIZE: usize = 64;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load settings from {:?}", path))?,
        None => AppConfig::load_or_default(),
    };

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_logging(cli.verbose, &config);

    match cli.command {
        Command::Ports => ports(),
        Command::Validate(args) => validate(args),
        Command::Parse(args) => parse(args, &config),
        Command::Capture(args) => capture(args, config),
    }
}

fn init_logging(verbose: u8, config: &AppConfig) -> Option<WorkerGuard> {
    let default_filter = match verbose {
        0 => "info,serial_capture=debug",
        _ => "info,serial_capture=trace",
    };

    let (file_layer, guard) = match &config.capture.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "serial-capture.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        let detail = [port.manufacturer.as_deref(), port.product.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        println!("{}\t{}\t{}", port.port_name, port.port_type, detail);
    }
    Ok(())
}

fn validate(args: ValidateArgs) -> anyhow::Result<()> {
    let config = PacketConfig::load(&args.packet_config)?;

    println!("title:  {}", config.title);
    println!("kind:   {} ({})", config.kind(), config.format.kind_name());
    match &config.format {
        PacketFormat::Delimited(f) => println!("ids:    {}", f.packet_ids.join(", ")),
        PacketFormat::Paired(f) => println!("ids:    {}", f.packet_ids.join(", ")),
        PacketFormat::HexFrame(f) | PacketFormat::BitFrame(f) => {
            println!("ids:    {}", f.packet_ids.join(", "));
            println!("fields: {}", f.header_order.join(", "));
        }
    }
    if let Some(example) = &config.example_line {
        println!("example: {}", example);
    }
    for (series, graph) in &config.graph_definitions {
        println!("graph:  {} -> {:?}", series, graph.id_mapping());
    }
    Ok(())
}

fn parse(args: ParseArgs, config: &AppConfig) -> anyhow::Result<()> {
    if args.chunk == 0 {
        bail!("--chunk must be at least 1");
    }
    let packet_config = PacketConfig::load(&args.packet_config)?;
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {:?}", args.input))?;

    let mut parser = FrameParser::new(Some(packet_config));
    let mut store = PacketStore::new(
        args.output
            .unwrap_or_else(|| config.capture.output_dir.clone()),
    );

    for chunk in bytes.chunks(args.chunk) {
        parser.append(chunk);
        let packets = parser.process();
        store.ingest(parser.config(), packets);
    }
    if !parser.buffered().is_empty() {
        tracing::info!("{} trailing bytes left unparsed", parser.buffered().len());
    }

    report(&store);
    let dir = store.save_all()?;
    println!("Saved to {}", dir.display());
    Ok(())
}

fn capture(args: CaptureArgs, config: AppConfig) -> anyhow::Result<()> {
    let packet_config = PacketConfig::load(&args.packet_config)?;

    let mut serial = config.serial.clone();
    if let Some(port) = args.port {
        serial.port_name = port;
    }
    if let Some(baud) = args.baud {
        serial.baud_rate = baud;
    }

    let transport: Box<dyn SerialTransport> = match &args.mock {
        Some(path) => {
            if serial.port_name.is_empty() {
                serial.port_name = "mock".to_string();
            }
            Box::new(ScriptedTransport::from_file(path, MOCK_CHUNK_SIZE)?)
        }
        None => Box::new(SerialPortTransport::new()),
    };

    let mut capture = config.capture.clone();
    if let Some(output) = args.output {
        capture.output_dir = output;
    }

    let mut session = CaptureSession::new(Some(packet_config), transport, capture)?;
    session
        .connect(serial)
        .context("Failed to connect to the serial device")?;

    let stop = Arc::new(AtomicBool::new(false));
    let stopper = spawn_stopper(args.seconds, Arc::clone(&stop))?;

    session.run_until(&stop);
    session.disconnect();

    report(session.store());
    let dir = session.save_all()?;
    println!("Saved to {}", dir.display());

    stopper
        .join()
        .map_err(|_| anyhow!("Stop trigger thread panicked"))?
}

/// Raise `stop` after `seconds`, or when a line is read from stdin
fn spawn_stopper(
    seconds: Option<f64>,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
    let handle = match seconds {
        Some(secs) => {
            let duration = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid duration {}", secs))?;
            std::thread::spawn(move || {
                std::thread::sleep(duration);
                stop.store(true, Ordering::SeqCst);
                Ok(())
            })
        }
        None => {
            println!("Capturing, press Enter to stop");
            std::thread::spawn(move || wait_for_enter(std::io::stdin().lock(), &stop))
        }
    };
    Ok(handle)
}

/// Block until a line arrives on `input`, then set `stop`. A failed read
/// still sets `stop` so the capture ends.
fn wait_for_enter(mut input: impl BufRead, stop: &AtomicBool) -> anyhow::Result<()> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .context("Failed to read stop request from stdin");
    stop.store(true, Ordering::SeqCst);
    read.map(|_| ())
}

fn report(store: &PacketStore) {
    for series in store.series() {
        println!("{:>24}: {} packets", series.to_string(), store.series_count(series));
    }
}
