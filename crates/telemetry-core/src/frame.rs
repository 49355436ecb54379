//! Telemetry frame model.
//!
//! A [`TelemetryFrame`] is one complete packet covering every sensor at a
//! single instant. Frames are self-contained: encoding one never depends on
//! another, which lets the broadcaster serialize each frame exactly once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stage::FlightStage;

/// Encoded wire form of a frame, shared by every subscriber.
pub type EncodedFrame = Arc<str>;

/// One telemetry packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Flight phase, when the producer knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<FlightStage>,
    pub imu: ImuReading,
    pub barometer1: BarometerReading,
    pub barometer2: BarometerReading,
    pub accelerometer: AccelerometerReading,
    /// Derived flight data, only present in historical replays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<FlightData>,
}

impl TelemetryFrame {
    /// Serialize the frame to its JSON text form.
    pub fn encode(&self) -> Result<EncodedFrame> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }

    /// Parse a frame from its JSON text form.
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Nine-axis IMU sample with fusion outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuReading {
    pub calibration_sys: u8,
    pub calibration_gyro: u8,
    pub calibration_accel: u8,
    pub calibration_mag: u8,
    pub orientation_x: f64,
    pub orientation_y: f64,
    pub orientation_z: f64,
    pub angular_velocity_x: f64,
    pub angular_velocity_y: f64,
    pub angular_velocity_z: f64,
    pub linear_acceleration_x: f64,
    pub linear_acceleration_y: f64,
    pub linear_acceleration_z: f64,
    pub acceleration_x: f64,
    pub acceleration_y: f64,
    pub acceleration_z: f64,
    pub gravity_x: f64,
    pub gravity_y: f64,
    pub gravity_z: f64,
    pub magnetometer_x: f64,
    pub magnetometer_y: f64,
    pub magnetometer_z: f64,
    pub quaternion_w: f64,
    pub quaternion_x: f64,
    pub quaternion_y: f64,
    pub quaternion_z: f64,
    pub temperature: f64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarometerReading {
    pub pressure: f64,
    pub temperature: f64,
    pub timestamp: f64,
}

/// High-g accelerometer sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerReading {
    pub acceleration_x: f64,
    pub acceleration_y: f64,
    pub acceleration_z: f64,
    pub timestamp: f64,
}

/// Derived flight data carried by historical replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightData {
    pub altitude: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    /// Stage label exactly as recorded in the source.
    pub stage: String,
}

/// Round `value` to `places` decimal digits.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn sample_frame(timestamp: f64) -> TelemetryFrame {
        TelemetryFrame {
            stage: Some(FlightStage::Launch),
            imu: ImuReading {
                calibration_sys: 3,
                calibration_gyro: 3,
                calibration_accel: 2,
                calibration_mag: 1,
                orientation_x: 12.5,
                orientation_y: -4.25,
                orientation_z: 180.0,
                angular_velocity_x: 0.125,
                angular_velocity_y: -0.5,
                angular_velocity_z: 0.0,
                linear_acceleration_x: 0.1,
                linear_acceleration_y: -0.2,
                linear_acceleration_z: 9.8,
                acceleration_x: 0.3,
                acceleration_y: -0.4,
                acceleration_z: 19.6,
                gravity_x: 0.0,
                gravity_y: 0.0,
                gravity_z: 9.81,
                magnetometer_x: 21.5,
                magnetometer_y: -3.0,
                magnetometer_z: 44.1,
                quaternion_w: 0.9,
                quaternion_x: 0.1,
                quaternion_y: 0.0,
                quaternion_z: 0.0,
                temperature: 35.2,
                timestamp,
            },
            barometer1: BarometerReading {
                pressure: 101320.55,
                temperature: 25.0,
                timestamp,
            },
            barometer2: BarometerReading {
                pressure: 101318.2,
                temperature: 25.0,
                timestamp,
            },
            accelerometer: AccelerometerReading {
                acceleration_x: 1.5,
                acceleration_y: -1.25,
                acceleration_z: 9.8,
                timestamp,
            },
            other: None,
        }
    }
}
