//! Telemetry bridge: serves live rocket telemetry over WebSocket.
//!
//! - [`cli::Args`] - Command line and environment configuration
//! - [`server::TelemetryServer`] - axum server accepting subscriber connections
//! - [`ws::WsSubscriber`] - A WebSocket connection as a telemetry subscriber
//! - [`app::run`] - Wires the producer, scheduler and server together

pub mod app;
pub mod cli;
pub mod error;
pub mod logging;
pub mod server;
pub mod ws;

pub use error::{Error, Result};
