/// Background recorder: tags detections with a position and persists them.
///
/// The event loop hands detections over a channel and never waits on the
/// location provider or the store. Each job reports one [`RecordOutcome`] back.
/// Jobs are not cancelled or coalesced when newer detections arrive; every
/// record carries the timestamp captured when its detection was made.

use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::detector::Detection;
use crate::location::{LocationError, LocationProvider, Position};
use crate::store::{HazardRecord, HazardStore};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Saved {
        key: String,
        record: HazardRecord,
    },
    /// No position, so nothing was written.
    LocationUnavailable {
        detection: Detection,
        reason: LocationError,
    },
    /// Positioned but the write failed. Not retried.
    StoreFailed {
        record: HazardRecord,
        reason: String,
    },
}

impl RecordOutcome {
    pub fn position(&self) -> Option<Position> {
        match self {
            RecordOutcome::Saved { record, .. } | RecordOutcome::StoreFailed { record, .. } => {
                Some(Position {
                    latitude: record.latitude,
                    longitude: record.longitude,
                })
            }
            RecordOutcome::LocationUnavailable { .. } => None,
        }
    }
}

pub struct Recorder {
    jobs: Option<mpsc::Sender<Detection>>,
    outcomes: mpsc::Receiver<RecordOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl Recorder {
    pub fn spawn(
        location: Box<dyn LocationProvider>,
        store: Box<dyn HazardStore>,
        collection: String,
    ) -> io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Detection>();
        let (out_tx, out_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("recorder".into())
            .spawn(move || {
                for detection in job_rx {
                    let outcome = record(location.as_ref(), store.as_ref(), &collection, detection);
                    // The event loop may already be gone during shutdown.
                    let _ = out_tx.send(outcome);
                }
            })?;

        Ok(Self {
            jobs: Some(job_tx),
            outcomes: out_rx,
            worker: Some(worker),
        })
    }

    /// Queue a detection. Never blocks.
    pub fn submit(&self, detection: Detection) {
        let sent = self
            .jobs
            .as_ref()
            .map(|jobs| jobs.send(detection).is_ok())
            .unwrap_or(false);
        if !sent {
            warn!(
                hazard = detection.kind.as_str(),
                "recorder is not running, detection dropped"
            );
        }
    }

    /// Outcomes that have completed since the last call.
    pub fn completed(&self) -> Vec<RecordOutcome> {
        self.outcomes.try_iter().collect()
    }

    /// Stop accepting work, wait for queued jobs and return their outcomes.
    pub fn finish(mut self) -> Vec<RecordOutcome> {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("recorder thread panicked");
            }
        }
        self.outcomes.try_iter().collect()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        // Closing the job channel lets the worker run out its queue and exit.
        self.jobs.take();
    }
}

/// One detection, start to finish: single location fetch, single write.
pub fn record(
    location: &dyn LocationProvider,
    store: &dyn HazardStore,
    collection: &str,
    detection: Detection,
) -> RecordOutcome {
    let position = match location.last_known() {
        Ok(position) => position,
        Err(reason) => {
            warn!(
                hazard = detection.kind.as_str(),
                provider = location.name(),
                %reason,
                "location unavailable, hazard not saved"
            );
            return RecordOutcome::LocationUnavailable { detection, reason };
        }
    };

    let record = HazardRecord::new(&detection, position);
    match store.push(collection, &record) {
        Ok(key) => {
            info!(
                %key,
                hazard = record.kind.as_str(),
                lat = record.latitude,
                lon = record.longitude,
                "hazard saved"
            );
            RecordOutcome::Saved { key, record }
        }
        Err(e) => {
            error!(hazard = record.kind.as_str(), error = %e, "error saving hazard");
            RecordOutcome::StoreFailed {
                record,
                reason: e.to_string(),
            }
        }
    }
}
