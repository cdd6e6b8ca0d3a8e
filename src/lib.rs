//! Road hazard detection from phone motion sensors.
//!
//! Samples flow one way through the crate:
//!
//! ```text
//! sensor ──► ingest ──► detector ──► recorder ──► location + store
//!                           │
//!                           └──► status / broadcast
//! ```
//!
//! [`ingest::Ingestor`] keeps the latest accelerometer and gyroscope magnitude,
//! [`detector::Classifier`] turns them into pothole / speed-breaker detections
//! behind a cooldown, and [`recorder::Recorder`] tags each detection with a
//! position and appends it to a [`store::HazardStore`] off the event thread.
//! [`monitor::Monitor`] runs that loop and keeps the status board current.

pub mod broadcast;
pub mod config;
pub mod detector;
pub mod ingest;
pub mod location;
pub mod monitor;
pub mod recorder;
pub mod sensor;
pub mod status;
pub mod store;

pub use config::Config;
pub use detector::{Classifier, Detection, DetectionState, HazardKind, Thresholds};
pub use ingest::{Ingestor, Magnitudes};
pub use monitor::{Monitor, Report};
pub use recorder::{RecordOutcome, Recorder};
pub use store::HazardRecord;

/// Wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
