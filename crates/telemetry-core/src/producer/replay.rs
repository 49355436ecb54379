//! Historical CSV replay.
//!
//! The whole dataset is loaded into memory before playback starts, so a
//! missing or structurally broken file aborts the strategy before a single
//! frame is sent. Rows are played back at their recorded speed and the
//! dataset loops forever.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{FrameSink, Producer, pace};
use crate::error::{Error, Result};
use crate::frame::{
    AccelerometerReading, BarometerReading, FlightData, ImuReading, TelemetryFrame,
};

/// Delay used when the recorded gap is unusable, and after the last row.
pub const FALLBACK_DELAY: Duration = Duration::from_millis(10);

/// Gaps longer than this are treated as corrupt timestamps.
const MAX_RECORDED_GAP_SECS: f64 = 1.0;

/// Pause between the end of the dataset and the next pass.
pub const RESTART_PAUSE: Duration = Duration::from_secs(3);

const PROGRESS_LOG_INTERVAL: usize = 100;

/// Columns every dataset must provide.
pub const REQUIRED_COLUMNS: [&str; 34] = [
    "timestamp",
    "calibration_sys",
    "calibration_gyro",
    "calibration_accel",
    "calibration_mag",
    "orientation_x",
    "orientation_y",
    "orientation_z",
    "angular_velocity_x",
    "angular_velocity_y",
    "angular_velocity_z",
    "linear_acceleration_x",
    "linear_acceleration_y",
    "linear_acceleration_z",
    "acceleration_x",
    "acceleration_y",
    "acceleration_z",
    "gravity_x",
    "gravity_y",
    "gravity_z",
    "magnetometer_x",
    "magnetometer_y",
    "magnetometer_z",
    "quaternion_w",
    "quaternion_x",
    "quaternion_y",
    "quaternion_z",
    "temperature",
    "pressure",
    "altitude",
    "velocity_x",
    "velocity_y",
    "velocity_z",
    "stage",
];

/// One recorded sample.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayRow {
    pub timestamp: f64,
    #[serde(deserialize_with = "calibration_level")]
    pub calibration_sys: u8,
    #[serde(deserialize_with = "calibration_level")]
    pub calibration_gyro: u8,
    #[serde(deserialize_with = "calibration_level")]
    pub calibration_accel: u8,
    #[serde(deserialize_with = "calibration_level")]
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
    pub pressure: f64,
    pub altitude: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    pub stage: String,
}

/// Calibration channels are small integers, but exporters often write them as `3.0`.
fn calibration_level<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.fract() == 0.0 && (0.0..=f64::from(u8::MAX)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(serde::de::Error::custom(format!(
            "invalid calibration level: {value}"
        )))
    }
}

impl ReplayRow {
    /// Build the frame for this row.
    ///
    /// Pressure and temperature are shared by both barometer slots, and the
    /// acceleration columns feed both the IMU and the accelerometer.
    pub fn to_frame(&self) -> TelemetryFrame {
        let timestamp = self.timestamp;
        let barometer = BarometerReading {
            pressure: self.pressure,
            temperature: self.temperature,
            timestamp,
        };

        TelemetryFrame {
            stage: self.stage.parse().ok(),
            imu: ImuReading {
                calibration_sys: self.calibration_sys,
                calibration_gyro: self.calibration_gyro,
                calibration_accel: self.calibration_accel,
                calibration_mag: self.calibration_mag,
                orientation_x: self.orientation_x,
                orientation_y: self.orientation_y,
                orientation_z: self.orientation_z,
                angular_velocity_x: self.angular_velocity_x,
                angular_velocity_y: self.angular_velocity_y,
                angular_velocity_z: self.angular_velocity_z,
                linear_acceleration_x: self.linear_acceleration_x,
                linear_acceleration_y: self.linear_acceleration_y,
                linear_acceleration_z: self.linear_acceleration_z,
                acceleration_x: self.acceleration_x,
                acceleration_y: self.acceleration_y,
                acceleration_z: self.acceleration_z,
                gravity_x: self.gravity_x,
                gravity_y: self.gravity_y,
                gravity_z: self.gravity_z,
                magnetometer_x: self.magnetometer_x,
                magnetometer_y: self.magnetometer_y,
                magnetometer_z: self.magnetometer_z,
                quaternion_w: self.quaternion_w,
                quaternion_x: self.quaternion_x,
                quaternion_y: self.quaternion_y,
                quaternion_z: self.quaternion_z,
                temperature: self.temperature,
                timestamp,
            },
            barometer1: barometer,
            barometer2: barometer,
            accelerometer: AccelerometerReading {
                acceleration_x: self.acceleration_x,
                acceleration_y: self.acceleration_y,
                acceleration_z: self.acceleration_z,
                timestamp,
            },
            other: Some(FlightData {
                altitude: self.altitude,
                velocity_x: self.velocity_x,
                velocity_y: self.velocity_y,
                velocity_z: self.velocity_z,
                stage: self.stage.clone(),
            }),
        }
    }
}

/// Delay to wait after a row recorded at `current` when the next row is at `next`.
pub fn playback_delay(current: f64, next: Option<f64>) -> Duration {
    match next {
        Some(next) => {
            let gap = next - current;
            if gap.is_finite() && (0.0..=MAX_RECORDED_GAP_SECS).contains(&gap) {
                Duration::from_secs_f64(gap)
            } else {
                FALLBACK_DELAY
            }
        }
        None => FALLBACK_DELAY,
    }
}

/// An in-memory replay dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows: Vec<ReplayRow>,
    skipped: usize,
}

impl Dataset {
    /// Parse a CSV dataset.
    ///
    /// Missing columns are fatal; individual rows that fail to parse are
    /// skipped and counted. A dataset without any usable row is an error.
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|column| !headers.iter().any(|header| header == *column))
            .collect();
        if !missing.is_empty() {
            return Err(Error::dataset(format!(
                "missing columns: {}",
                missing.join(", ")
            )));
        }

        let mut rows = Vec::new();
        let mut skipped = 0;
        for (index, record) in reader.deserialize::<ReplayRow>().enumerate() {
            match record {
                Ok(row) => rows.push(row),
                Err(e) => {
                    skipped += 1;
                    debug!(row = index, error = %e, "Skipping malformed replay row");
                }
            }
        }

        if rows.is_empty() {
            return Err(Error::dataset("dataset contains no usable rows"));
        }
        if skipped > 0 {
            warn!(skipped, kept = rows.len(), "Skipped malformed replay rows");
        }

        Ok(Self { rows, skipped })
    }

    /// Read and parse a dataset from disk.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::source_unavailable(path.display().to_string(), e))?;
        Self::from_reader(bytes.as_slice())
    }

    pub fn rows(&self) -> &[ReplayRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows dropped while parsing.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Pacing delay after emitting row `index`.
    pub fn delay_after(&self, index: usize) -> Duration {
        let current = self.rows[index].timestamp;
        let next = self.rows.get(index + 1).map(|row| row.timestamp);
        playback_delay(current, next)
    }
}

/// Replays a CSV dataset in a loop.
#[derive(Debug)]
pub struct ReplayProducer {
    path: PathBuf,
}

impl ReplayProducer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Play `dataset` until cancelled.
    pub async fn play(
        dataset: &Dataset,
        sink: &mut dyn FrameSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = dataset.len();
        loop {
            info!(rows = total, "Starting replay playback");

            for (index, row) in dataset.rows().iter().enumerate() {
                if cancel.is_cancelled() {
                    return Ok(());
                }

                sink.emit(row.to_frame()).await;

                if index % PROGRESS_LOG_INTERVAL == 0 {
                    debug!(row = index, total, "Replay progress");
                }

                if !pace(cancel, dataset.delay_after(index)).await {
                    return Ok(());
                }
            }

            info!("Replay playback finished, restarting");
            if !pace(cancel, RESTART_PAUSE).await {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl Producer for ReplayProducer {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn run(&mut self, sink: &mut dyn FrameSink, cancel: &CancellationToken) -> Result<()> {
        let dataset = Dataset::load(&self.path).await?;
        info!(
            path = %self.path.display(),
            rows = dataset.len(),
            "Loaded replay dataset"
        );

        Self::play(&dataset, sink, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::test_support::CollectingSink;
    use crate::stage::FlightStage;
    use proptest::prelude::*;
    use std::io::Write;

    const HEADER: &str = "timestamp,calibration_sys,calibration_gyro,calibration_accel,calibration_mag,\
orientation_x,orientation_y,orientation_z,angular_velocity_x,angular_velocity_y,angular_velocity_z,\
linear_acceleration_x,linear_acceleration_y,linear_acceleration_z,acceleration_x,acceleration_y,acceleration_z,\
gravity_x,gravity_y,gravity_z,magnetometer_x,magnetometer_y,magnetometer_z,\
quaternion_w,quaternion_x,quaternion_y,quaternion_z,temperature,pressure,altitude,\
velocity_x,velocity_y,velocity_z,stage";

    fn row(timestamp: f64, altitude: f64, stage: &str) -> String {
        format!(
            "{timestamp},3,3,2.0,1,10.5,-20.25,30,0.1,0.2,0.3,0.4,0.5,9.81,1.1,1.2,11.3,\
0,0,9.81,12.5,-7.5,40,0.9,0.1,0,0,24.5,{pressure},{altitude},0.5,-0.5,{velocity},{stage}",
            pressure = 101325.0 - altitude * 12.0,
            velocity = altitude / 10.0,
        )
    }

    fn dataset_csv(rows: &[String]) -> String {
        let mut csv = String::from(HEADER);
        for row in rows {
            csv.push('\n');
            csv.push_str(row);
        }
        csv.push('\n');
        csv
    }

    #[test]
    fn test_row_maps_to_frame() {
        let csv = dataset_csv(&[row(1.25, 120.0, "ACCELERATED_FLIGHT")]);
        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();
        let frame = dataset.rows()[0].to_frame();

        assert_eq!(frame.stage, Some(FlightStage::AcceleratedFlight));
        assert_eq!(frame.imu.calibration_accel, 2);
        assert_eq!(frame.imu.orientation_y, -20.25);
        assert_eq!(frame.imu.timestamp, 1.25);
        assert_eq!(frame.barometer1, frame.barometer2);
        assert_eq!(frame.barometer1.pressure, 101325.0 - 120.0 * 12.0);
        assert_eq!(frame.barometer1.temperature, 24.5);
        assert_eq!(frame.accelerometer.acceleration_z, 11.3);
        assert_eq!(frame.accelerometer.acceleration_z, frame.imu.acceleration_z);

        let other = frame.other.unwrap();
        assert_eq!(other.altitude, 120.0);
        assert_eq!(other.velocity_z, 12.0);
        assert_eq!(other.stage, "ACCELERATED_FLIGHT");
    }

    #[test]
    fn test_numeric_and_unknown_stage_labels() {
        let csv = dataset_csv(&[row(0.0, 0.0, "4"), row(0.1, 0.0, "coasting")]);
        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();

        let numeric = dataset.rows()[0].to_frame();
        assert_eq!(numeric.stage, Some(FlightStage::AcceleratedFlight));
        assert_eq!(numeric.other.unwrap().stage, "4");

        let unknown = dataset.rows()[1].to_frame();
        assert_eq!(unknown.stage, None);
        assert_eq!(unknown.other.unwrap().stage, "coasting");
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let csv = "timestamp,pressure\n0.0,101325\n";
        let err = Dataset::from_reader(csv.as_bytes()).unwrap_err();
        match err {
            Error::Dataset(msg) => {
                assert!(msg.contains("calibration_sys"));
                assert!(msg.contains("stage"));
                assert!(!msg.contains("pressure"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let csv = dataset_csv(&[
            row(0.0, 1.0, "LAUNCH"),
            "0.1,not-a-number".to_string(),
            row(0.2, 2.0, "LAUNCH"),
        ]);
        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.skipped(), 1);
        assert_eq!(dataset.rows()[1].timestamp, 0.2);
    }

    #[test]
    fn test_empty_dataset_is_fatal() {
        let csv = dataset_csv(&[]);
        assert!(matches!(
            Dataset::from_reader(csv.as_bytes()),
            Err(Error::Dataset(_))
        ));
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let mut csv = String::from(HEADER);
        csv.push_str(",notes\n");
        csv.push_str(&row(0.0, 5.0, "LAUNCH"));
        csv.push_str(",first sample\n");

        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_playback_delays() {
        let csv = dataset_csv(&[
            row(0.0, 0.0, "INACTIVE"),
            row(0.05, 0.0, "INACTIVE"),
            row(1.5, 0.0, "INACTIVE"),
            row(1.51, 0.0, "INACTIVE"),
        ]);
        let dataset = Dataset::from_reader(csv.as_bytes()).unwrap();

        let delays: Vec<f64> = (0..dataset.len())
            .map(|index| dataset.delay_after(index).as_secs_f64())
            .collect();
        let expected = [0.05, 0.01, 0.01, 0.01];
        for (delay, want) in delays.iter().zip(expected) {
            assert!((delay - want).abs() < 1e-6, "delay {delay} != {want}");
        }
    }

    #[test]
    fn test_negative_gap_uses_fallback() {
        assert_eq!(playback_delay(5.0, Some(4.0)), FALLBACK_DELAY);
        assert_eq!(playback_delay(5.0, Some(f64::NAN)), FALLBACK_DELAY);
        assert_eq!(playback_delay(5.0, None), FALLBACK_DELAY);
        assert_eq!(playback_delay(5.0, Some(6.0)), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");

        let mut producer = ReplayProducer::new(&missing);
        let cancel = CancellationToken::new();
        let mut sink = CollectingSink::new(1, cancel.clone());

        let err = producer.run(&mut sink, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
        assert!(!err.is_recoverable());
        assert!(sink.frames.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_in_order_and_loops() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let rows = [
            row(10.0, 1.0, "LAUNCH"),
            row(10.2, 2.0, "LAUNCH"),
            row(10.4, 3.0, "ACCELERATED_FLIGHT"),
        ];
        file.write_all(dataset_csv(&rows).as_bytes()).unwrap();

        let cancel = CancellationToken::new();
        let mut sink = CollectingSink::new(5, cancel.clone());
        let mut producer = ReplayProducer::new(file.path());

        let started = tokio::time::Instant::now();
        producer.run(&mut sink, &cancel).await.unwrap();

        let altitudes: Vec<f64> = sink
            .frames
            .iter()
            .map(|frame| frame.other.as_ref().unwrap().altitude)
            .collect();
        assert_eq!(altitudes, vec![1.0, 2.0, 3.0, 1.0, 2.0]);

        // 0.2 + 0.2 + 0.01 + 3 s restart pause + 0.2
        let elapsed = started.elapsed().as_secs_f64();
        assert!((elapsed - 3.61).abs() < 0.01, "elapsed {elapsed}");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_delay_is_gap_or_fallback(current in -1.0e6f64..1.0e6, gap in -5.0f64..5.0) {
            let delay = playback_delay(current, Some(current + gap)).as_secs_f64();
            let actual_gap = (current + gap) - current;
            if (0.0..=1.0).contains(&actual_gap) {
                prop_assert!((delay - actual_gap).abs() < 1e-8);
            } else {
                prop_assert_eq!(delay, 0.01);
            }
        }
    }
}
