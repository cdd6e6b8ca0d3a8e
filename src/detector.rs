/// Priority-ordered hazard classifier with a detection cooldown.
/// Classifies impacts into potholes and speed breakers from the latest
/// accelerometer magnitude and, when a gyroscope is present, rotation rate.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::ingest::Magnitudes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Pothole,
    SpeedBreaker,
}

impl HazardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::Pothole => "pothole",
            HazardKind::SpeedBreaker => "speed_breaker",
        }
    }

    /// Status line shown while the alert is active.
    pub fn alert_text(&self) -> &'static str {
        match self {
            HazardKind::Pothole => "POTHOLE DETECTED",
            HazardKind::SpeedBreaker => "SPEED BREAKER DETECTED",
        }
    }

    pub fn toast_text(&self) -> &'static str {
        match self {
            HazardKind::Pothole => "Pothole detected!",
            HazardKind::SpeedBreaker => "Speed breaker detected!",
        }
    }
}

/// Classification thresholds. Accelerations in m/s², rotation in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub pothole: f64,
    pub speed_breaker_min: f64,
    pub speed_breaker_max: f64,
    pub rotation: f64,
    pub cooldown_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pothole: 18.0,           // ~1.8g total, a hard jolt on top of gravity
            speed_breaker_min: 12.0, // gentler vertical bump
            speed_breaker_max: 16.0,
            rotation: 3.0, // pitch rate while the wheels climb the ramp
            cooldown_ms: 2000,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [
            ("pothole", self.pothole),
            ("speed_breaker_min", self.speed_breaker_min),
            ("speed_breaker_max", self.speed_breaker_max),
            ("rotation", self.rotation),
        ];
        for (name, value) in values {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "threshold {name} must be a positive number, got {value}"
                )));
            }
        }
        if self.speed_breaker_min >= self.speed_breaker_max {
            return Err(ConfigError::Invalid(format!(
                "speed breaker band is empty: min {} >= max {}",
                self.speed_breaker_min, self.speed_breaker_max
            )));
        }
        // The pothole rule runs first, so a band above it could never match.
        if self.speed_breaker_max > self.pothole {
            return Err(ConfigError::Invalid(format!(
                "speed breaker max {} exceeds pothole threshold {}",
                self.speed_breaker_max, self.pothole
            )));
        }
        Ok(())
    }
}

/// A positive classification, stamped with the wall-clock time it was made.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "type")]
    pub kind: HazardKind,
    pub accel: f64,
    pub rotation: Option<f64>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

/// Last-detection bookkeeping. Owned by the event loop and lent to the
/// classifier on every evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionState {
    last_detection_ms: Option<u64>,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_detection_ms(&self) -> Option<u64> {
        self.last_detection_ms
    }

    /// True until strictly more than `cooldown_ms` has passed since the last
    /// detection. A clock that steps backwards counts as still cooling down.
    pub fn cooling_down(&self, now_ms: u64, cooldown_ms: u64) -> bool {
        match self.last_detection_ms {
            Some(last) => now_ms.saturating_sub(last) <= cooldown_ms,
            None => false,
        }
    }
}

struct Rule {
    kind: HazardKind,
    matches: fn(&Thresholds, f64, Option<f64>) -> bool,
}

fn is_pothole(t: &Thresholds, accel: f64, _rotation: Option<f64>) -> bool {
    accel > t.pothole
}

fn is_speed_breaker(t: &Thresholds, accel: f64, rotation: Option<f64>) -> bool {
    accel > t.speed_breaker_min
        && accel < t.speed_breaker_max
        && rotation.is_some_and(|r| r > t.rotation)
}

// Evaluated top to bottom, first match wins.
const RULES: [Rule; 2] = [
    Rule {
        kind: HazardKind::Pothole,
        matches: is_pothole,
    },
    Rule {
        kind: HazardKind::SpeedBreaker,
        matches: is_speed_breaker,
    },
];

pub struct Classifier {
    thresholds: Thresholds,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Apply the rules to a pair of magnitudes, ignoring the cooldown.
    /// `rotation` is `None` when no gyroscope reading is available, in which
    /// case only the pothole rule can match.
    pub fn classify(&self, accel: f64, rotation: Option<f64>) -> Option<HazardKind> {
        RULES
            .iter()
            .find(|rule| (rule.matches)(&self.thresholds, accel, rotation))
            .map(|rule| rule.kind)
    }

    /// Evaluate the latest magnitudes at `now_ms`.
    /// Returns a Detection and records it in `state` if a rule matched and the
    /// cooldown has elapsed.
    pub fn evaluate(
        &self,
        state: &mut DetectionState,
        magnitudes: &Magnitudes,
        now_ms: u64,
    ) -> Option<Detection> {
        if state.cooling_down(now_ms, self.thresholds.cooldown_ms) {
            return None;
        }

        let accel = magnitudes.accel?;
        let kind = self.classify(accel, magnitudes.gyro)?;

        state.last_detection_ms = Some(now_ms);
        Some(Detection {
            kind,
            accel,
            rotation: magnitudes.gyro,
            timestamp_ms: now_ms,
        })
    }
}
