//! Producer strategies.
//!
//! A producer generates the frame sequence for the whole process lifetime.
//! Exactly one strategy is selected at startup from [`ProducerConfig`]:
//!
//! - [`SimulatedProducer`] - synthetic flight physics at 20 Hz
//! - [`ReplayProducer`] - historical CSV playback at recorded speed
//! - [`DeviceProducer`] - pass-through of JSON lines from a live device
//!
//! Producers yield control only at pacing points, and every pacing point
//! observes the shared [`CancellationToken`], so shutdown always lands
//! between two frames.

mod device;
mod replay;
mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{ProducerConfig, ProducerMode};
use crate::error::Result;
use crate::frame::{EncodedFrame, TelemetryFrame};

pub use device::{DeviceProducer, LineStats, MAX_LINE_LENGTH, decode_line, pump_lines};
pub use replay::{Dataset, ReplayProducer, ReplayRow, playback_delay};
pub use simulated::{FlightSimulator, SimulatedProducer};

/// Receiver of produced frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Hand one complete frame downstream.
    async fn emit(&mut self, frame: TelemetryFrame);

    /// Hand downstream a frame that is already in wire form.
    async fn emit_encoded(&mut self, frame: EncodedFrame);
}

/// A strategy that generates telemetry frames.
#[async_trait]
pub trait Producer: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produce frames into `sink` until cancelled, exhausted or failed.
    ///
    /// Returns `Ok(())` when cancelled or when the sequence is complete.
    async fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancellationToken) -> Result<()>;
}

/// The closed set of producer strategies.
#[derive(Debug)]
pub enum ProducerStrategy {
    Simulated(SimulatedProducer),
    Replay(ReplayProducer),
    Device(DeviceProducer),
}

impl ProducerStrategy {
    /// Build the strategy selected by `config`.
    pub fn from_config(config: &ProducerConfig) -> Self {
        match config.mode {
            ProducerMode::Simulated => Self::Simulated(SimulatedProducer::new()),
            ProducerMode::Replay => Self::Replay(ReplayProducer::new(&config.replay_path)),
            ProducerMode::Device => Self::Device(DeviceProducer::new(&config.device_path)),
        }
    }

    pub fn mode(&self) -> ProducerMode {
        match self {
            Self::Simulated(_) => ProducerMode::Simulated,
            Self::Replay(_) => ProducerMode::Replay,
            Self::Device(_) => ProducerMode::Device,
        }
    }
}

#[async_trait]
impl Producer for ProducerStrategy {
    fn name(&self) -> &'static str {
        match self {
            Self::Simulated(producer) => producer.name(),
            Self::Replay(producer) => producer.name(),
            Self::Device(producer) => producer.name(),
        }
    }

    async fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancellationToken) -> Result<()> {
        match self {
            Self::Simulated(producer) => producer.run(sink, cancel).await,
            Self::Replay(producer) => producer.run(sink, cancel).await,
            Self::Device(producer) => producer.run(sink, cancel).await,
        }
    }
}

/// Wait for `delay` unless cancellation arrives first.
///
/// Returns `false` when the token was cancelled.
pub(crate) async fn pace(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Wall-clock seconds since the Unix epoch, with microsecond resolution.
pub(crate) fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Sink that keeps every frame and cancels once `limit` frames arrived.
    pub struct CollectingSink {
        pub frames: Vec<TelemetryFrame>,
        pub encoded: Vec<EncodedFrame>,
        limit: usize,
        cancel: CancellationToken,
    }

    impl CollectingSink {
        pub fn new(limit: usize, cancel: CancellationToken) -> Self {
            Self {
                frames: Vec::new(),
                encoded: Vec::new(),
                limit,
                cancel,
            }
        }

        fn check_limit(&self) {
            if self.frames.len() + self.encoded.len() >= self.limit {
                self.cancel.cancel();
            }
        }
    }

    #[async_trait]
    impl FrameSink for CollectingSink {
        async fn emit(&mut self, frame: TelemetryFrame) {
            self.frames.push(frame);
            self.check_limit();
        }

        async fn emit_encoded(&mut self, frame: EncodedFrame) {
            self.encoded.push(frame);
            self.check_limit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_strategy_selection() {
        let simulated = ProducerStrategy::from_config(&ProducerConfig::simulated());
        assert_eq!(simulated.mode(), ProducerMode::Simulated);
        assert_eq!(simulated.name(), "simulated");

        let replay = ProducerStrategy::from_config(&ProducerConfig::replay("flight.csv"));
        assert_eq!(replay.mode(), ProducerMode::Replay);
        match &replay {
            ProducerStrategy::Replay(producer) => {
                assert_eq!(producer.path(), PathBuf::from("flight.csv").as_path())
            }
            other => panic!("unexpected strategy: {other:?}"),
        }

        let device = ProducerStrategy::from_config(&ProducerConfig::device("/dev/ttyACM0"));
        assert_eq!(device.mode(), ProducerMode::Device);
        assert_eq!(device.name(), "device");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_observes_cancellation() {
        let cancel = CancellationToken::new();
        assert!(pace(&cancel, Duration::from_millis(50)).await);

        cancel.cancel();
        assert!(!pace(&cancel, Duration::from_secs(3600)).await);
    }

    #[test]
    fn test_unix_timestamp_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(unix_timestamp() > 1_577_836_800.0);
    }
}
