/// Daemon configuration: YAML file defaults, overridden by the command line.
///
/// Every section is optional in the file; a missing key takes the value from
/// the section's `Default` impl.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::detector::Thresholds;
use crate::sensor::Source;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub sensor: SensorConfig,
    pub location: LocationConfig,
    pub store: StoreConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub source: Source,
    /// Delivery interval requested from the platform, also the replay pace.
    pub delay_ms: u32,
    /// Subscribe to the gyroscope. Without it only potholes can be detected.
    pub gyroscope: bool,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: Source::Termux,
            delay_ms: 200, // platform "normal" sensor rate
            gyroscope: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Termux,
    Fixed,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub provider: LocationKind,
    /// Provider passed to `termux-location -p` (gps, network, passive).
    pub termux_provider: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            provider: LocationKind::Termux,
            termux_provider: "gps".to_string(),
            latitude: None,
            longitude: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    RealtimeDb,
    Jsonl,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Realtime Database root, e.g. `https://<project>-default-rtdb.<region>.firebasedatabase.app`
    pub url: Option<String>,
    pub auth: Option<String>,
    pub collection: String,
    pub timeout_secs: u64,
    pub path: PathBuf,
    /// Write a greeting under `test` at startup to check the store is reachable.
    pub probe: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Jsonl,
            url: None,
            auth: None,
            collection: "hazards".to_string(),
            timeout_secs: 10,
            path: PathBuf::from("hazards.jsonl"),
            probe: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// How long the detection alert stays up before reverting to idle.
    pub alert_ms: u64,
    /// Minimum gap between raw-value lines in the log. 0 turns them off.
    pub raw_interval_ms: u64,
    /// Unix socket for JSON-line detection subscribers. `null` disables it.
    pub socket: Option<PathBuf>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            alert_ms: 3000,
            raw_interval_ms: 1000,
            socket: Some(PathBuf::from("/tmp/roadhazard.sock")),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a valid "all defaults" config.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        if self.sensor.delay_ms == 0 {
            return Err(ConfigError::Invalid("sensor.delay_ms must be > 0".into()));
        }

        if self.location.provider == LocationKind::Fixed {
            match (self.location.latitude, self.location.longitude) {
                (Some(lat), Some(lon)) if valid_coordinates(lat, lon) => {}
                (Some(_), Some(_)) => {
                    return Err(ConfigError::Invalid(
                        "location.latitude/longitude out of range".into(),
                    ))
                }
                _ => {
                    return Err(ConfigError::Invalid(
                        "fixed location requires location.latitude and location.longitude".into(),
                    ))
                }
            }
        }

        if self.store.collection.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid("store.collection is empty".into()));
        }
        if self.store.kind == StoreKind::RealtimeDb && self.store.url.is_none() {
            return Err(ConfigError::Invalid(
                "realtime_db store requires store.url".into(),
            ));
        }

        Ok(())
    }
}

pub(crate) fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.sensor.source, Source::Termux);
        assert_eq!(config.store.kind, StoreKind::Jsonl);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let yaml = r#"
thresholds:
  pothole: 22.5
sensor:
  source: rides/commute.json
  gyroscope: false
store:
  kind: realtime_db
  url: https://example-default-rtdb.firebaseio.com
feedback:
  socket: null
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.thresholds.pothole, 22.5);
        assert_eq!(config.thresholds.cooldown_ms, 2000);
        assert_eq!(
            config.sensor.source,
            Source::File(PathBuf::from("rides/commute.json"))
        );
        assert!(!config.sensor.gyroscope);
        assert_eq!(config.sensor.delay_ms, 200);
        assert_eq!(config.store.kind, StoreKind::RealtimeDb);
        assert_eq!(config.store.collection, "hazards");
        assert_eq!(config.feedback.socket, None);
        assert_eq!(config.feedback.alert_ms, 3000);
        assert_eq!(config.feedback.raw_interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn realtime_db_without_url_is_invalid() {
        let config = Config::from_yaml("store:\n  kind: realtime_db\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn fixed_location_needs_valid_coordinates() {
        let mut config = Config::default();
        config.location.provider = LocationKind::Fixed;
        assert!(config.validate().is_err());

        config.location.latitude = Some(12.97);
        config.location.longitude = Some(77.59);
        assert!(config.validate().is_ok());

        config.location.latitude = Some(97.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_store_kind_fails_to_parse() {
        assert!(Config::from_yaml("store:\n  kind: s3\n").is_err());
    }

    #[test]
    fn bad_thresholds_fail_validation() {
        let yaml = "thresholds:\n  speed_breaker_min: 17\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load(Path::new("/nonexistent/roadhazard.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/roadhazard.yaml"));
    }
}
