//! Scheduler loop.
//!
//! Drives the selected producer and hands every frame to the broadcaster.
//! Producer outcomes are handled as follows:
//!
//! | outcome              | action                               |
//! |----------------------|--------------------------------------|
//! | cancelled            | stop                                 |
//! | sequence completed   | yield, then restart                  |
//! | recoverable error    | log, wait [`RESTART_DELAY`], restart |
//! | fatal error          | log, stop, return the error          |
//!
//! A fatal producer error never tears down the subscriber side; the caller
//! decides whether the server keeps running.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::error::Result;
use crate::frame::{EncodedFrame, TelemetryFrame};
use crate::producer::{FrameSink, Producer};

/// Pause before restarting after a recoverable producer error.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Counters collected over a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Frames handed to the broadcaster.
    pub frames: u64,
    /// Frames that reached at least one subscriber.
    pub delivered_frames: u64,
    /// Producer restarts after completion or recoverable errors.
    pub restarts: u64,
}

struct BroadcastSink<'a> {
    broadcaster: &'a Broadcaster,
    stats: &'a mut SchedulerStats,
}

impl BroadcastSink<'_> {
    fn record(&mut self, report: BroadcastReport) {
        self.stats.frames += 1;
        if report.delivered > 0 {
            self.stats.delivered_frames += 1;
        }
        if report.failed + report.timed_out > 0 {
            debug!(
                failed = report.failed,
                timed_out = report.timed_out,
                evicted = report.evicted,
                delivered = report.delivered,
                "Broadcast reached only part of the subscribers"
            );
        }
    }
}

#[async_trait]
impl FrameSink for BroadcastSink<'_> {
    async fn emit(&mut self, frame: TelemetryFrame) {
        let report = self.broadcaster.broadcast(&frame).await;
        self.record(report);
    }

    async fn emit_encoded(&mut self, frame: EncodedFrame) {
        let report = self.broadcaster.broadcast_encoded(frame).await;
        self.record(report);
    }
}

/// Runs one producer for the lifetime of the process.
pub struct Scheduler<P> {
    producer: P,
    broadcaster: Broadcaster,
    cancel: CancellationToken,
}

impl<P: Producer> Scheduler<P> {
    pub fn new(producer: P, broadcaster: Broadcaster, cancel: CancellationToken) -> Self {
        Self {
            producer,
            broadcaster,
            cancel,
        }
    }

    /// Run until cancelled or until the producer fails fatally.
    pub async fn run(mut self) -> Result<SchedulerStats> {
        let name = self.producer.name();
        let mut stats = SchedulerStats::default();
        info!(producer = name, "Telemetry scheduler started");

        let result = loop {
            let outcome = {
                let mut sink = BroadcastSink {
                    broadcaster: &self.broadcaster,
                    stats: &mut stats,
                };
                self.producer.run(&mut sink, &self.cancel).await
            };

            if self.cancel.is_cancelled() {
                break Ok(());
            }

            match outcome {
                Ok(()) => {
                    debug!(producer = name, "Producer sequence completed, restarting");
                    // Completion without an await point would otherwise spin.
                    tokio::task::yield_now().await;
                }
                Err(e) if e.is_recoverable() => {
                    warn!(producer = name, error = %e, "Producer interrupted, restarting");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(RESTART_DELAY) => {}
                    }
                }
                Err(e) => {
                    error!(producer = name, error = %e, "Producer failed");
                    break Err(e);
                }
            }
            stats.restarts += 1;
        };

        info!(
            producer = name,
            frames = stats.frames,
            delivered_frames = stats.delivered_frames,
            restarts = stats.restarts,
            "Telemetry scheduler stopped"
        );
        result.map(|()| stats)
    }
}
