//! Producer configuration.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default CSV dataset used by the replay strategy.
pub const DEFAULT_REPLAY_PATH: &str = "src/simulation_data.csv";

/// Default device channel used by the passthrough strategy.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/ttyUSB0";

/// Which producer strategy runs for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerMode {
    /// Synthetic physics simulation.
    Simulated,
    /// Historical CSV replay.
    #[default]
    Replay,
    /// Live device pass-through.
    Device,
}

impl ProducerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Replay => "replay",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for ProducerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy selection and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub mode: ProducerMode,
    /// CSV dataset for [`ProducerMode::Replay`].
    #[serde(default = "default_replay_path")]
    pub replay_path: PathBuf,
    /// Line-oriented channel for [`ProducerMode::Device`].
    #[serde(default = "default_device_path")]
    pub device_path: PathBuf,
}

fn default_replay_path() -> PathBuf {
    PathBuf::from(DEFAULT_REPLAY_PATH)
}

fn default_device_path() -> PathBuf {
    PathBuf::from(DEFAULT_DEVICE_PATH)
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            mode: ProducerMode::default(),
            replay_path: default_replay_path(),
            device_path: default_device_path(),
        }
    }
}

impl ProducerConfig {
    pub fn simulated() -> Self {
        Self {
            mode: ProducerMode::Simulated,
            ..Default::default()
        }
    }

    pub fn replay(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: ProducerMode::Replay,
            replay_path: path.into(),
            ..Default::default()
        }
    }

    pub fn device(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: ProducerMode::Device,
            device_path: path.into(),
            ..Default::default()
        }
    }
}
