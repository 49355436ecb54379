//! Telemetry core: rocket telemetry production and live fan-out.
//!
//! This crate produces a continuous stream of rocket telemetry frames from
//! one of several sources and pushes every frame to all connected
//! subscribers. It knows nothing about the transport subscribers use.
//!
//! ## Core Types
//!
//! - [`TelemetryFrame`] - One multi-sensor snapshot, serialized as a JSON object
//! - [`FlightStage`] - Ordered flight phases derived from elapsed time
//!
//! ## Producers
//!
//! - [`Producer`] - Trait implemented by every frame source
//! - [`SimulatedProducer`] - Synthetic flight physics at 20 Hz
//! - [`ReplayProducer`] - Historical CSV playback at recorded speed
//! - [`DeviceProducer`] - Pass-through of newline-delimited JSON from a device
//! - [`ProducerStrategy`] - The strategy selected from a [`ProducerConfig`]
//!
//! ## Fan-out
//!
//! - [`Subscriber`] - Trait for anything frames can be pushed to
//! - [`SubscriberRegistry`] - Concurrent set of live subscribers
//! - [`Broadcaster`] - Encode-once, best-effort delivery to every subscriber
//! - [`Scheduler`] - Drives a producer and hands each frame to the broadcaster

pub mod broadcast;
pub mod config;
pub mod error;
pub mod frame;
pub mod producer;
pub mod registry;
pub mod scheduler;
pub mod stage;

pub use broadcast::{BroadcastReport, Broadcaster, DEFAULT_SEND_TIMEOUT};
pub use config::{ProducerConfig, ProducerMode};
pub use error::{Error, Result, SendError};
pub use frame::{
    AccelerometerReading, BarometerReading, EncodedFrame, FlightData, ImuReading, TelemetryFrame,
};
pub use producer::{
    DeviceProducer, FrameSink, Producer, ProducerStrategy, ReplayProducer, SimulatedProducer,
};
pub use registry::{Subscriber, SubscriberId, SubscriberRegistry};
pub use scheduler::{Scheduler, SchedulerStats};
pub use stage::FlightStage;
