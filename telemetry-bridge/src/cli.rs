//! Command line arguments.
//!
//! Every option can also be set through its environment variable, and a
//! `.env` file in the working directory is loaded before parsing.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use telemetry_core::config::{DEFAULT_DEVICE_PATH, DEFAULT_REPLAY_PATH};
use telemetry_core::{ProducerConfig, ProducerMode};

use crate::server::{DEFAULT_BIND_ADDRESS, DEFAULT_PORT, ServerConfig};

/// Where telemetry frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Source {
    /// Replay a recorded CSV flight
    #[default]
    #[value(alias = "replay")]
    File,
    /// Simulate a flight
    #[value(alias = "simulated")]
    Random,
    /// Forward JSON lines from a serial device
    #[value(alias = "device")]
    Serial,
}

impl Source {
    /// Parse a source name, ignoring case and surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name.trim(), true).ok()
    }

    pub fn mode(self) -> ProducerMode {
        match self {
            Source::File => ProducerMode::Replay,
            Source::Random => ProducerMode::Simulated,
            Source::Serial => ProducerMode::Device,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File => write!(f, "file"),
            Source::Random => write!(f, "random"),
            Source::Serial => write!(f, "serial"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Rocket telemetry WebSocket bridge", long_about = None)]
pub struct Args {
    /// Telemetry source: file, random or serial. Unknown values fall back to file
    #[arg(long, env = "TELEMETRY_SOURCE", default_value = "file")]
    pub source: String,

    /// CSV dataset replayed in file mode
    #[arg(long, env = "TELEMETRY_FILE", default_value = DEFAULT_REPLAY_PATH)]
    pub file: PathBuf,

    /// Device read in serial mode
    #[arg(long, env = "TELEMETRY_DEVICE", default_value = DEFAULT_DEVICE_PATH)]
    pub port: PathBuf,

    /// Address the WebSocket server binds to
    #[arg(long, env = "TELEMETRY_BIND", default_value = DEFAULT_BIND_ADDRESS)]
    pub bind: String,

    /// Port the WebSocket server listens on
    #[arg(long, env = "TELEMETRY_LISTEN_PORT", default_value_t = DEFAULT_PORT)]
    pub listen_port: u16,

    /// Upper bound for delivering one frame to one client, in milliseconds
    #[arg(
        long,
        env = "TELEMETRY_SEND_TIMEOUT_MS",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub send_timeout_ms: u64,

    /// Also write daily-rotated log files into this directory
    #[arg(long, env = "TELEMETRY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    /// The selected source, or `None` if the name is not recognized.
    pub fn parsed_source(&self) -> Option<Source> {
        Source::from_name(&self.source)
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            mode: self.parsed_source().unwrap_or_default().mode(),
            replay_path: self.file.clone(),
            device_path: self.port.clone(),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.bind.clone(),
            port: self.listen_port,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
