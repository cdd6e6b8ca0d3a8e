/// Best-effort position lookup used to tag a detection before it is stored.

use std::process::Command;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{valid_coordinates, ConfigError, LocationConfig, LocationKind};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location permission not granted")]
    PermissionDenied,
    #[error("no position fix available")]
    NoFix,
    #[error("location request failed: {0}")]
    Failed(String),
}

/// A single "last known position" request. Implementations must not retry.
pub trait LocationProvider: Send {
    fn last_known(&self) -> Result<Position, LocationError>;

    fn name(&self) -> &'static str;
}

/// `termux-location -p <provider> -r last`
pub struct TermuxLocation {
    provider: String,
}

impl TermuxLocation {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl LocationProvider for TermuxLocation {
    fn last_known(&self) -> Result<Position, LocationError> {
        let output = Command::new("termux-location")
            .arg("-p")
            .arg(&self.provider)
            .arg("-r")
            .arg("last")
            .output()
            .map_err(|e| LocationError::Failed(format!("termux-location: {e}")))?;

        parse_termux_location(
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    fn name(&self) -> &'static str {
        "termux"
    }
}

/// Interpret `termux-location` output. An empty reply means the platform has
/// no cached fix.
pub(crate) fn parse_termux_location(stdout: &str, stderr: &str) -> Result<Position, LocationError> {
    if mentions_permission(stdout) || mentions_permission(stderr) {
        return Err(LocationError::PermissionDenied);
    }

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(LocationError::NoFix);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| LocationError::Failed(format!("unparseable reply: {e}")))?;

    if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
        return Err(LocationError::Failed(err.to_string()));
    }

    match (
        value.get("latitude").and_then(|v| v.as_f64()),
        value.get("longitude").and_then(|v| v.as_f64()),
    ) {
        (Some(latitude), Some(longitude)) if valid_coordinates(latitude, longitude) => {
            Ok(Position {
                latitude,
                longitude,
            })
        }
        (Some(latitude), Some(longitude)) => Err(LocationError::Failed(format!(
            "coordinates out of range: {latitude}, {longitude}"
        ))),
        _ => Err(LocationError::NoFix),
    }
}

fn mentions_permission(text: &str) -> bool {
    text.to_ascii_lowercase().contains("permission")
}

/// Always reports the same position. Useful on a bench or a parked vehicle.
pub struct FixedLocation(pub Position);

impl LocationProvider for FixedLocation {
    fn last_known(&self) -> Result<Position, LocationError> {
        Ok(self.0)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Location disabled: behaves like a denied runtime permission.
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn last_known(&self) -> Result<Position, LocationError> {
        Err(LocationError::PermissionDenied)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

pub fn build(config: &LocationConfig) -> Result<Box<dyn LocationProvider>, ConfigError> {
    match config.provider {
        LocationKind::Termux => Ok(Box::new(TermuxLocation::new(&config.termux_provider))),
        LocationKind::None => Ok(Box::new(NoLocation)),
        LocationKind::Fixed => match (config.latitude, config.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Box::new(FixedLocation(Position {
                latitude,
                longitude,
            }))),
            _ => Err(ConfigError::Invalid(
                "fixed location requires latitude and longitude".into(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_termux_reply() {
        let reply = r#"{
  "latitude": 12.9716,
  "longitude": 77.5946,
  "altitude": 920.0,
  "accuracy": 6.4,
  "bearing": 0.0,
  "speed": 0.0,
  "elapsedMs": 31,
  "provider": "gps"
}"#;
        let pos = parse_termux_location(reply, "").unwrap();
        assert_eq!(pos.latitude, 12.9716);
        assert_eq!(pos.longitude, 77.5946);
    }

    #[test]
    fn empty_reply_is_no_fix() {
        assert_eq!(parse_termux_location("", ""), Err(LocationError::NoFix));
        assert_eq!(parse_termux_location("  \n", ""), Err(LocationError::NoFix));
        assert_eq!(
            parse_termux_location(r#"{"provider": "gps"}"#, ""),
            Err(LocationError::NoFix)
        );
    }

    #[test]
    fn permission_message_is_permission_denied() {
        assert_eq!(
            parse_termux_location("", "Please grant the following permission: ACCESS_FINE_LOCATION"),
            Err(LocationError::PermissionDenied)
        );
    }

    #[test]
    fn error_field_and_garbage_are_failures() {
        assert!(matches!(
            parse_termux_location(r#"{"error": "GPS disabled"}"#, ""),
            Err(LocationError::Failed(msg)) if msg == "GPS disabled"
        ));
        assert!(matches!(
            parse_termux_location("<html>", ""),
            Err(LocationError::Failed(_))
        ));
        assert!(matches!(
            parse_termux_location(r#"{"latitude": 123.0, "longitude": 0.0}"#, ""),
            Err(LocationError::Failed(_))
        ));
    }

    #[test]
    fn build_from_config() {
        let mut config = LocationConfig::default();
        assert_eq!(build(&config).unwrap().name(), "termux");

        config.provider = LocationKind::None;
        let none = build(&config).unwrap();
        assert_eq!(none.last_known(), Err(LocationError::PermissionDenied));

        config.provider = LocationKind::Fixed;
        assert!(build(&config).is_err());
        config.latitude = Some(1.5);
        config.longitude = Some(-2.5);
        let fixed = build(&config).unwrap();
        assert_eq!(
            fixed.last_known(),
            Ok(Position {
                latitude: 1.5,
                longitude: -2.5
            })
        );
    }
}
