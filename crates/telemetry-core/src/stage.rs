//! Flight stage enumeration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Named phase of a flight, ordered from power-on to recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStage {
    Inactive = 0,
    Calibrating = 1,
    ReadyForLaunch = 2,
    Launch = 3,
    AcceleratedFlight = 4,
    BallisticFlight = 5,
    Apogee = 6,
    Stabilization = 7,
    Landing = 8,
    Recovery = 9,
}

/// Upper bounds (exclusive, seconds) of each simulated stage.
const STAGE_THRESHOLDS: [(f64, FlightStage); 9] = [
    (5.0, FlightStage::Inactive),
    (10.0, FlightStage::Calibrating),
    (15.0, FlightStage::ReadyForLaunch),
    (18.0, FlightStage::Launch),
    (25.0, FlightStage::AcceleratedFlight),
    (35.0, FlightStage::BallisticFlight),
    (40.0, FlightStage::Apogee),
    (50.0, FlightStage::Stabilization),
    (60.0, FlightStage::Landing),
];

impl FlightStage {
    pub const ALL: [FlightStage; 10] = [
        Self::Inactive,
        Self::Calibrating,
        Self::ReadyForLaunch,
        Self::Launch,
        Self::AcceleratedFlight,
        Self::BallisticFlight,
        Self::Apogee,
        Self::Stabilization,
        Self::Landing,
        Self::Recovery,
    ];

    /// Stage of the simulated flight after `elapsed` seconds.
    pub fn at(elapsed: f64) -> Self {
        STAGE_THRESHOLDS
            .iter()
            .find(|(bound, _)| elapsed < *bound)
            .map(|(_, stage)| *stage)
            .unwrap_or(Self::Recovery)
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Wire name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Calibrating => "CALIBRATING",
            Self::ReadyForLaunch => "READY_FOR_LAUNCH",
            Self::Launch => "LAUNCH",
            Self::AcceleratedFlight => "ACCELERATED_FLIGHT",
            Self::BallisticFlight => "BALLISTIC_FLIGHT",
            Self::Apogee => "APOGEE",
            Self::Stabilization => "STABILIZATION",
            Self::Landing => "LANDING",
            Self::Recovery => "RECOVERY",
        }
    }

    /// Stages during which the motor or gravity drive the vertical velocity.
    pub fn is_ascent(self) -> bool {
        (Self::Launch..=Self::Apogee).contains(&self)
    }

    /// Stages after apogee, under parachute.
    pub fn is_descent(self) -> bool {
        self > Self::Apogee
    }
}

impl fmt::Display for FlightStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stage label matches no known stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStage(pub String);

impl fmt::Display for UnknownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown flight stage: {}", self.0)
    }
}

impl std::error::Error for UnknownStage {}

impl FromStr for FlightStage {
    type Err = UnknownStage;

    /// Accepts the wire name (any case) or the ordinal, e.g. `"4"` or `"4.0"`.
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let label = label.trim();
        if let Some(stage) = Self::ALL
            .iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(label))
        {
            return Ok(*stage);
        }

        label
            .parse::<f64>()
            .ok()
            .filter(|value| value.fract() == 0.0 && *value >= 0.0)
            .and_then(|value| Self::from_ordinal(value as u8))
            .ok_or_else(|| UnknownStage(label.to_string()))
    }
}

impl<'de> Deserialize<'de> for FlightStage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Ordinal(u8),
            Float(f64),
            Label(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Ordinal(value) => Self::from_ordinal(value).ok_or_else(|| {
                serde::de::Error::custom(format!("stage ordinal out of range: {value}"))
            }),
            Repr::Float(value) => value.to_string().parse().map_err(serde::de::Error::custom),
            Repr::Label(label) => label.parse().map_err(serde::de::Error::custom),
        }
    }
}
