//! Broadcast fan-out.
//!
//! Each frame is encoded once and pushed to every registered subscriber
//! concurrently. Delivery is best-effort and at-most-once: a failing or
//! wedged subscriber is counted, evicted from the registry and told to close,
//! so the next frame never waits on it. Failures never surface as an error to
//! the producer.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, error, trace, warn};

use crate::frame::{EncodedFrame, TelemetryFrame};
use crate::registry::{Subscriber, SubscriberId, SubscriberRegistry};

/// Default upper bound for a single subscriber send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one subscriber delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Failed,
    TimedOut,
}

/// Summary of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Whether the frame was serialized at all.
    pub encoded: bool,
    /// Open subscribers a send was attempted on.
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Subscribers removed from the registry after a failed or timed out send.
    pub evicted: usize,
}

/// Pushes frames to every subscriber in a [`SubscriberRegistry`].
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self::with_send_timeout(registry, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(registry: Arc<SubscriberRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Deliver `frame` to every subscriber registered at the time of the call.
    pub async fn broadcast(&self, frame: &TelemetryFrame) -> BroadcastReport {
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            return BroadcastReport::default();
        }

        match frame.encode() {
            Ok(encoded) => self.deliver(subscribers, encoded).await,
            Err(e) => {
                error!(error = %e, "Failed to encode telemetry frame");
                BroadcastReport {
                    attempted: subscribers.len(),
                    failed: subscribers.len(),
                    ..Default::default()
                }
            }
        }
    }

    /// Deliver an already encoded payload, such as a line forwarded verbatim
    /// from a device.
    pub async fn broadcast_encoded(&self, encoded: EncodedFrame) -> BroadcastReport {
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            return BroadcastReport::default();
        }
        self.deliver(subscribers, encoded).await
    }

    async fn deliver(
        &self,
        subscribers: Vec<(SubscriberId, Arc<dyn Subscriber>)>,
        encoded: EncodedFrame,
    ) -> BroadcastReport {
        let send_timeout = self.send_timeout;
        let deliveries = subscribers
            .into_iter()
            .filter(|(id, subscriber)| {
                let open = subscriber.is_open();
                if !open {
                    trace!(subscriber = %id, "Skipping closed subscriber");
                }
                open
            })
            .map(|(id, subscriber)| {
                let frame = Arc::clone(&encoded);
                async move {
                    let outcome =
                        match tokio::time::timeout(send_timeout, subscriber.send(frame)).await {
                            Ok(Ok(())) => Delivery::Delivered,
                            Ok(Err(e)) => {
                                debug!(subscriber = %id, error = %e, "Frame delivery failed");
                                Delivery::Failed
                            }
                            Err(_) => {
                                debug!(subscriber = %id, timeout = ?send_timeout, "Frame delivery timed out");
                                Delivery::TimedOut
                            }
                        };
                    (id, subscriber, outcome)
                }
            });

        let outcomes: Vec<(SubscriberId, Arc<dyn Subscriber>, Delivery)> =
            join_all(deliveries).await;

        let mut report = BroadcastReport {
            encoded: true,
            attempted: outcomes.len(),
            ..Default::default()
        };
        for (id, subscriber, outcome) in outcomes {
            match outcome {
                Delivery::Delivered => {
                    report.delivered += 1;
                    continue;
                }
                Delivery::Failed => report.failed += 1,
                Delivery::TimedOut => report.timed_out += 1,
            }
            // A subscriber that failed once is never waited on again.
            if self.registry.unregister(id) {
                report.evicted += 1;
                warn!(subscriber = %id, outcome = ?outcome, "Evicting unresponsive subscriber");
            }
            subscriber.evict();
        }
        report
    }
}
