use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "serial-capture",
    version,
    about = "Capture packets from a serial device and export them as CSV",
    long_about = "Reads a serial byte stream, frames it according to a JSON packet config\n\
                  and writes one CSV file per series into a timestamped run directory."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file (default: platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List available serial ports
    Ports,
    /// Load and validate a packet config
    Validate(ValidateArgs),
    /// Frame a recorded byte stream offline and export every series
    Parse(ParseArgs),
    /// Capture from a serial device and export on exit
    Capture(CaptureArgs),
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Packet config (JSON)
    pub packet_config: PathBuf,
}

#[derive(Args)]
pub struct ParseArgs {
    /// Packet config (JSON)
    pub packet_config: PathBuf,

    /// Raw byte stream to parse
    pub input: PathBuf,

    /// Feed the parser this many bytes at a time
    #[arg(long, default_value_t = 64)]
    pub chunk: usize,

    /// Export root directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct CaptureArgs {
    /// Packet config (JSON)
    pub packet_config: PathBuf,

    /// Serial port (overrides the settings file)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate (overrides the settings file)
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Stop after this many seconds (default: wait for Enter)
    #[arg(short, long)]
    pub seconds: Option<f64>,

    /// Export root directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replay this file instead of opening a serial port
    #[arg(long)]
    pub mock: Option<PathBuf>,
}
