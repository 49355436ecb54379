//! Synthetic flight simulation.
//!
//! Physics integrates at a fixed virtual step of 0.1 s per tick while frames
//! are emitted at 20 Hz of wall-clock time, so simulated time runs at twice
//! real time. The flight loops every 70 simulated seconds.

use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{FrameSink, Producer, unix_timestamp};
use crate::error::Result;
use crate::frame::{
    AccelerometerReading, BarometerReading, ImuReading, TelemetryFrame, round_to,
};
use crate::stage::FlightStage;

/// Virtual seconds advanced per physics tick.
pub const PHYSICS_STEP_SECS: f64 = 0.1;

/// Wall-clock interval between emitted frames (20 Hz).
pub const EMIT_INTERVAL: Duration = Duration::from_millis(50);

const TICKS_PER_SECOND: f64 = 10.0;
/// The flight restarts once elapsed time exceeds 70 s.
const CYCLE_TICKS: u32 = 700;

/// Motor thrust during accelerated flight, ~10 g.
const THRUST_ACCEL: f64 = 98.0;
const GRAVITY_ACCEL: f64 = -9.8;
/// Constant sink rate under parachute.
const PARACHUTE_VELOCITY: f64 = -5.0;

const SEA_LEVEL_PRESSURE_PA: f64 = 101_325.0;
const PRESSURE_LAPSE: f64 = 2.25577e-5;
const PRESSURE_EXPONENT: f64 = 5.25588;

/// Evolving state of the simulated flight.
#[derive(Debug)]
pub struct FlightSimulator {
    tick: u32,
    velocity: f64,
    altitude: f64,
    stage: FlightStage,
    rng: StdRng,
}

impl Default for FlightSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightSimulator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Simulator with reproducible sensor noise.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tick: 0,
            velocity: 0.0,
            altitude: 0.0,
            stage: FlightStage::Inactive,
            rng,
        }
    }

    /// Elapsed simulated time in seconds.
    pub fn elapsed(&self) -> f64 {
        self.tick as f64 / TICKS_PER_SECOND
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn stage(&self) -> FlightStage {
        self.stage
    }

    /// Advance one physics tick and synthesize the frame for it.
    pub fn step(&mut self, timestamp: f64) -> TelemetryFrame {
        self.tick += 1;
        if self.tick > CYCLE_TICKS {
            self.tick = 0;
            self.altitude = 0.0;
            self.velocity = 0.0;
        }

        let stage = FlightStage::at(self.elapsed());
        self.integrate(stage);
        self.stage = stage;

        self.synthesize(timestamp)
    }

    fn integrate(&mut self, stage: FlightStage) {
        if stage.is_ascent() {
            let accel = if stage == FlightStage::AcceleratedFlight {
                THRUST_ACCEL
            } else {
                GRAVITY_ACCEL
            };
            self.velocity += accel * PHYSICS_STEP_SECS;
            self.altitude += self.velocity * PHYSICS_STEP_SECS;
        } else if stage.is_descent() && self.altitude > 0.0 {
            self.velocity = PARACHUTE_VELOCITY;
            self.altitude += self.velocity * PHYSICS_STEP_SECS;
        }

        if self.altitude < 0.0 {
            self.altitude = 0.0;
        }
    }

    fn noise(&mut self, bound: f64) -> f64 {
        self.rng.random_range(-bound..=bound)
    }

    fn synthesize(&mut self, timestamp: f64) -> TelemetryFrame {
        let t = self.elapsed();
        let velocity = self.velocity;
        let altitude = self.altitude;
        let vertical_accel = round_to(velocity / 10.0 + 9.8, 2);

        let imu = ImuReading {
            calibration_sys: 3,
            calibration_gyro: 3,
            calibration_accel: 3,
            calibration_mag: 3,
            orientation_x: round_to(t.sin() * 180.0, 2),
            orientation_y: round_to(t.cos() * 180.0, 2),
            orientation_z: round_to(t % 360.0, 2),
            angular_velocity_x: round_to(self.noise(1.0), 3),
            angular_velocity_y: round_to(self.noise(1.0), 3),
            angular_velocity_z: round_to(self.noise(1.0), 3),
            linear_acceleration_x: round_to(self.noise(0.5), 2),
            linear_acceleration_y: round_to(self.noise(0.5), 2),
            linear_acceleration_z: vertical_accel,
            acceleration_x: round_to(self.noise(0.5), 2),
            acceleration_y: round_to(self.noise(0.5), 2),
            acceleration_z: vertical_accel,
            gravity_x: 0.0,
            gravity_y: 0.0,
            gravity_z: 9.81,
            magnetometer_x: round_to(self.noise(50.0), 1),
            magnetometer_y: round_to(self.noise(50.0), 1),
            magnetometer_z: round_to(self.noise(50.0), 1),
            quaternion_w: 0.9,
            quaternion_x: 0.1,
            quaternion_y: 0.0,
            quaternion_z: 0.0,
            temperature: round_to(35.0 + self.noise(1.0), 1),
            timestamp,
        };

        let pressure_base = barometric_pressure(altitude);
        let air_temperature = round_to(25.0 - altitude / 100.0, 1);
        let barometer1 = BarometerReading {
            pressure: round_to(pressure_base + self.noise(10.0), 2),
            temperature: air_temperature,
            timestamp,
        };
        let barometer2 = BarometerReading {
            pressure: round_to(pressure_base + self.noise(10.0), 2),
            temperature: air_temperature,
            timestamp,
        };

        let accelerometer = AccelerometerReading {
            acceleration_x: round_to(self.noise(2.0), 2),
            acceleration_y: round_to(self.noise(2.0), 2),
            acceleration_z: round_to(velocity * 0.5 + 9.8, 2),
            timestamp,
        };

        TelemetryFrame {
            stage: Some(self.stage),
            imu,
            barometer1,
            barometer2,
            accelerometer,
            other: None,
        }
    }
}

/// Standard-atmosphere pressure at `altitude` metres.
///
/// Clamped to zero above the altitude where the approximation breaks down.
fn barometric_pressure(altitude: f64) -> f64 {
    SEA_LEVEL_PRESSURE_PA * (1.0 - PRESSURE_LAPSE * altitude).max(0.0).powf(PRESSURE_EXPONENT)
}

/// Default strategy: emits simulated flight frames forever.
#[derive(Debug, Default)]
pub struct SimulatedProducer {
    simulator: FlightSimulator,
}

impl SimulatedProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_simulator(simulator: FlightSimulator) -> Self {
        Self { simulator }
    }

    pub fn simulator(&self) -> &FlightSimulator {
        &self.simulator
    }
}

#[async_trait]
impl Producer for SimulatedProducer {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancellationToken) -> Result<()> {
        info!(
            step_secs = PHYSICS_STEP_SECS,
            interval_ms = EMIT_INTERVAL.as_millis() as u64,
            "Simulated flight started"
        );

        let mut ticker = tokio::time::interval(EMIT_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let frame = self.simulator.step(unix_timestamp());
            sink.emit(frame).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::test_support::CollectingSink;
    use proptest::prelude::*;

    fn advance_to(simulator: &mut FlightSimulator, ticks: u32) -> TelemetryFrame {
        let mut frame = simulator.step(0.0);
        for _ in 1..ticks {
            frame = simulator.step(0.0);
        }
        frame
    }

    #[test]
    fn test_ground_phases_stay_at_rest() {
        let mut simulator = FlightSimulator::seeded(7);
        let frame = advance_to(&mut simulator, 149);

        assert_eq!(simulator.stage(), FlightStage::ReadyForLaunch);
        assert_eq!(simulator.velocity(), 0.0);
        assert_eq!(simulator.altitude(), 0.0);
        assert_eq!(frame.stage, Some(FlightStage::ReadyForLaunch));
    }

    #[test]
    fn test_thrust_at_twenty_seconds() {
        let mut simulator = FlightSimulator::seeded(1);
        advance_to(&mut simulator, 199);
        let prior_velocity = simulator.velocity();
        assert_eq!(simulator.stage(), FlightStage::AcceleratedFlight);

        let frame = simulator.step(0.0);
        assert!((simulator.elapsed() - 20.0).abs() < 1e-9);
        assert_eq!(simulator.stage(), FlightStage::AcceleratedFlight);
        assert_eq!(frame.stage, Some(FlightStage::AcceleratedFlight));
        assert!((simulator.velocity() - prior_velocity - 9.8).abs() < 1e-9);
    }

    #[test]
    fn test_parachute_sets_constant_sink_rate() {
        let mut simulator = FlightSimulator::seeded(3);
        // First tick after apogee, still airborne.
        advance_to(&mut simulator, 401);
        assert_eq!(simulator.stage(), FlightStage::Stabilization);
        assert!(simulator.altitude() > 0.0);
        assert_eq!(simulator.velocity(), PARACHUTE_VELOCITY);
    }

    #[test]
    fn test_cycle_resets_state() {
        let mut simulator = FlightSimulator::seeded(5);
        advance_to(&mut simulator, 700);
        assert!((simulator.elapsed() - 70.0).abs() < 1e-9);

        let frame = simulator.step(0.0);
        assert_eq!(simulator.elapsed(), 0.0);
        assert_eq!(simulator.velocity(), 0.0);
        assert_eq!(simulator.altitude(), 0.0);
        assert_eq!(frame.stage, Some(FlightStage::Inactive));
    }

    #[test]
    fn test_sensor_bounds() {
        let mut simulator = FlightSimulator::seeded(11);
        for _ in 0..700 {
            let frame = simulator.step(42.5);
            let imu = &frame.imu;

            for value in [
                imu.angular_velocity_x,
                imu.angular_velocity_y,
                imu.angular_velocity_z,
            ] {
                assert!((-1.0..=1.0).contains(&value));
            }
            for value in [
                imu.linear_acceleration_x,
                imu.linear_acceleration_y,
                imu.acceleration_x,
                imu.acceleration_y,
            ] {
                assert!((-0.5..=0.5).contains(&value));
            }
            for value in [imu.magnetometer_x, imu.magnetometer_y, imu.magnetometer_z] {
                assert!((-50.0..=50.0).contains(&value));
            }
            assert!((34.0..=36.0).contains(&imu.temperature));
            assert_eq!(imu.gravity_z, 9.81);
            assert_eq!(imu.calibration_sys, 3);
            assert_eq!(imu.timestamp, 42.5);

            let base = barometric_pressure(simulator.altitude());
            for baro in [frame.barometer1, frame.barometer2] {
                assert!((baro.pressure - base).abs() <= 10.01);
                assert_eq!(baro.timestamp, 42.5);
            }

            let accel = frame.accelerometer;
            assert!((-2.0..=2.0).contains(&accel.acceleration_x));
            assert!((-2.0..=2.0).contains(&accel.acceleration_y));
            assert_eq!(
                accel.acceleration_z,
                round_to(simulator.velocity() * 0.5 + 9.8, 2)
            );
            assert!(frame.other.is_none());
        }
    }

    #[test]
    fn test_barometric_pressure() {
        assert_eq!(barometric_pressure(0.0), SEA_LEVEL_PRESSURE_PA);
        assert!(barometric_pressure(1000.0) < barometric_pressure(500.0));
        assert_eq!(barometric_pressure(50_000.0), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_emits_at_twenty_hertz() {
        let cancel = CancellationToken::new();
        let mut sink = CollectingSink::new(5, cancel.clone());
        let mut producer = SimulatedProducer::with_simulator(FlightSimulator::seeded(9));

        let started = tokio::time::Instant::now();
        producer.run(&mut sink, &cancel).await.unwrap();

        assert_eq!(sink.frames.len(), 5);
        // The first frame is immediate, the next four are 50 ms apart.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(250));
        assert!((producer.simulator().elapsed() - 0.5).abs() < 1e-9);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_altitude_never_negative(seed in any::<u64>(), ticks in 1u32..1500) {
            let mut simulator = FlightSimulator::seeded(seed);
            for _ in 0..ticks {
                simulator.step(0.0);
                prop_assert!(simulator.altitude() >= 0.0);
            }
        }

        #[test]
        fn prop_stage_non_decreasing_within_cycle(ticks in 2u32..700) {
            let mut simulator = FlightSimulator::seeded(0);
            simulator.step(0.0);
            let mut previous = simulator.stage();
            for _ in 1..ticks {
                simulator.step(0.0);
                prop_assert!(simulator.stage() >= previous);
                previous = simulator.stage();
            }
        }
    }
}
