/// Terminal feedback: the text fields a rider glances at.
///
/// The detection status has two states. An alert shows for `alert_ms` after the
/// most recent detection and then reverts to idle on the next `tick`.

use chrono::{Local, TimeZone};

use crate::detector::{Detection, HazardKind};
use crate::recorder::RecordOutcome;
use crate::sensor::{Channel, Sample};

pub const IDLE_TEXT: &str = "No hazard detected";
pub const LOCATION_UNAVAILABLE: &str = "Location unavailable";

#[derive(Debug)]
pub struct StatusBoard {
    alert_ms: u64,
    alert: Option<(HazardKind, u64)>,
    accel_text: String,
    gyro_text: String,
    magnitude_text: String,
    gps_text: String,
    timestamp_text: String,
}

impl StatusBoard {
    pub fn new(alert_ms: u64) -> Self {
        Self {
            alert_ms,
            alert: None,
            accel_text: "Accelerometer: waiting".into(),
            gyro_text: "Gyroscope: waiting".into(),
            magnitude_text: "Magnitude: -".into(),
            gps_text: "Lat: -, Lon: -".into(),
            timestamp_text: "Detected at: -".into(),
        }
    }

    /// Refresh the raw-value fields from a reading.
    pub fn show_sample(&mut self, sample: &Sample, magnitude: f64) {
        match sample.channel {
            Channel::Accelerometer => {
                self.accel_text = format!(
                    "Accelerometer: X={:.2} Y={:.2} Z={:.2}",
                    sample.x, sample.y, sample.z
                );
                self.magnitude_text = format!("Magnitude: {magnitude:.2}");
            }
            Channel::Gyroscope => {
                self.gyro_text = format!(
                    "Gyroscope: X={:.2} Y={:.2} Z={:.2} (|w|={magnitude:.2})",
                    sample.x, sample.y, sample.z
                );
            }
        }
    }

    /// Raise the alert and return the one-shot toast line.
    pub fn on_detection(&mut self, detection: &Detection) -> String {
        self.alert = Some((
            detection.kind,
            detection.timestamp_ms.saturating_add(self.alert_ms),
        ));
        self.timestamp_text = format!(
            "Detected at: {} ({})",
            detection.timestamp_ms,
            local_time(detection.timestamp_ms)
        );
        detection.kind.toast_text().to_string()
    }

    pub fn on_outcome(&mut self, outcome: &RecordOutcome) {
        self.gps_text = match outcome.position() {
            Some(p) => format!("Lat: {}, Lon: {}", p.latitude, p.longitude),
            None => LOCATION_UNAVAILABLE.to_string(),
        };
    }

    /// Revert an expired alert. Returns true when the status changed.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        match self.alert {
            Some((_, until)) if now_ms >= until => {
                self.alert = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_alert(&self) -> bool {
        self.alert.is_some()
    }

    pub fn status_text(&self) -> &str {
        match self.alert {
            Some((kind, _)) => kind.alert_text(),
            None => IDLE_TEXT,
        }
    }

    pub fn gps_text(&self) -> &str {
        &self.gps_text
    }

    /// Latest raw readings on one line.
    pub fn raw_text(&self) -> String {
        format!(
            "{} | {} | {}",
            self.accel_text, self.gyro_text, self.magnitude_text
        )
    }

    pub fn render(&self) -> String {
        [
            self.accel_text.as_str(),
            self.gyro_text.as_str(),
            self.magnitude_text.as_str(),
            self.status_text(),
            self.gps_text.as_str(),
            self.timestamp_text.as_str(),
        ]
        .join("\n")
    }
}

fn local_time(timestamp_ms: u64) -> String {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "?".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationError;
    use crate::store::HazardRecord;

    fn detection(kind: HazardKind, timestamp_ms: u64) -> Detection {
        Detection {
            kind,
            accel: 20.0,
            rotation: None,
            timestamp_ms,
        }
    }

    #[test]
    fn alert_shows_then_reverts_after_duration() {
        let mut board = StatusBoard::new(3000);
        assert_eq!(board.status_text(), IDLE_TEXT);

        let toast = board.on_detection(&detection(HazardKind::Pothole, 10_000));
        assert_eq!(toast, "Pothole detected!");
        assert_eq!(board.status_text(), "POTHOLE DETECTED");

        assert!(!board.tick(12_999));
        assert!(board.is_alert());
        assert!(board.tick(13_000));
        assert_eq!(board.status_text(), IDLE_TEXT);
        assert!(!board.tick(20_000));
    }

    #[test]
    fn newer_detection_extends_alert() {
        let mut board = StatusBoard::new(3000);
        board.on_detection(&detection(HazardKind::Pothole, 0));
        board.on_detection(&detection(HazardKind::SpeedBreaker, 2_500));
        assert!(!board.tick(3_000));
        assert_eq!(board.status_text(), "SPEED BREAKER DETECTED");
        assert!(board.tick(5_500));
    }

    #[test]
    fn outcome_updates_coordinates() {
        let mut board = StatusBoard::new(3000);
        let d = detection(HazardKind::Pothole, 1);
        board.on_outcome(&RecordOutcome::LocationUnavailable {
            detection: d,
            reason: LocationError::NoFix,
        });
        assert_eq!(board.gps_text(), LOCATION_UNAVAILABLE);

        board.on_outcome(&RecordOutcome::Saved {
            key: "-N1".into(),
            record: HazardRecord {
                kind: HazardKind::Pothole,
                latitude: 12.5,
                longitude: 77.25,
                timestamp: 1,
            },
        });
        assert_eq!(board.gps_text(), "Lat: 12.5, Lon: 77.25");
    }

    #[test]
    fn render_includes_raw_values() {
        let mut board = StatusBoard::new(3000);
        let sample = Sample {
            channel: Channel::Accelerometer,
            x: 3.0,
            y: 4.0,
            z: 0.0,
        };
        board.show_sample(&sample, 5.0);
        let text = board.render();
        assert!(text.contains("X=3.00 Y=4.00 Z=0.00"));
        assert!(text.contains("Magnitude: 5.00"));
        assert!(text.contains(IDLE_TEXT));
        assert_eq!(
            board.raw_text(),
            "Accelerometer: X=3.00 Y=4.00 Z=0.00 | Gyroscope: waiting | Magnitude: 5.00"
        );
    }
}
