/// The detection loop: samples in, detections out, feedback kept current.
///
/// Only accelerometer readings trigger evaluation. Gyroscope readings refresh
/// the rotation rate that the next accelerometer evaluation sees. Recorder
/// outcomes are folded into the status board on every pass, so coordinates
/// appear as soon as the background write completes.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::FeedbackConfig;
use crate::detector::{Classifier, Detection, DetectionState};
use crate::ingest::Ingestor;
use crate::recorder::{RecordOutcome, Recorder};
use crate::sensor::{Channel, Sample};
use crate::status::StatusBoard;

// Upper bound on how late the alert reset can fire when samples stop.
const TICK: Duration = Duration::from_millis(100);

/// What a finished run saw.
#[derive(Debug, Default)]
pub struct Report {
    pub detections: Vec<Detection>,
    pub outcomes: Vec<RecordOutcome>,
    pub accel_samples: u64,
    pub gyro_samples: u64,
    pub ignored: u64,
}

pub struct Monitor {
    classifier: Classifier,
    ingestor: Ingestor,
    state: DetectionState,
    board: StatusBoard,
    raw_interval_ms: u64,
    last_raw_ms: Option<u64>,
    hits: u64,
}

impl Monitor {
    pub fn new(classifier: Classifier, feedback: &FeedbackConfig) -> Self {
        Self {
            classifier,
            ingestor: Ingestor::new(),
            state: DetectionState::new(),
            board: StatusBoard::new(feedback.alert_ms),
            raw_interval_ms: feedback.raw_interval_ms,
            last_raw_ms: None,
            hits: 0,
        }
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    /// Feed one sample observed at `now_ms`.
    pub fn handle(&mut self, sample: &Sample, now_ms: u64) -> Option<Detection> {
        let magnitude = self.ingestor.ingest(sample)?;
        self.board.show_sample(sample, magnitude);

        if sample.channel != Channel::Accelerometer {
            return None;
        }
        self.show_raw(now_ms);

        let detection = self
            .classifier
            .evaluate(&mut self.state, &self.ingestor.magnitudes(), now_ms)?;
        self.hits += 1;
        let toast = self.board.on_detection(&detection);

        info!(
            "hit #{} [{}  accel={:.2}  rotation={}]  {}",
            self.hits,
            detection.kind.as_str(),
            detection.accel,
            detection
                .rotation
                .map(|r| format!("{r:.2}"))
                .unwrap_or_else(|| "-".into()),
            toast,
        );
        info!("status: {}", self.board.status_text());
        Some(detection)
    }

    /// Revert the alert once it has been up for its full duration.
    pub fn tick(&mut self, now_ms: u64) {
        if self.board.tick(now_ms) {
            info!("status: {}", self.board.status_text());
        }
    }

    pub fn apply_outcome(&mut self, outcome: &RecordOutcome) {
        self.board.on_outcome(outcome);
        info!("{}", self.board.gps_text());
    }

    /// Consume samples until every sender on `rx` is gone, then let the
    /// recorder finish its queue. `clock` supplies epoch milliseconds and
    /// `emit` sees each detection after it has been queued for recording.
    pub fn run<C, E>(
        &mut self,
        rx: &Receiver<Sample>,
        recorder: Recorder,
        mut clock: C,
        mut emit: E,
    ) -> Report
    where
        C: FnMut() -> u64,
        E: FnMut(&Detection),
    {
        let mut report = Report::default();

        loop {
            let received = rx.recv_timeout(TICK);
            let now = clock();
            match received {
                Ok(sample) => {
                    if let Some(detection) = self.handle(&sample, now) {
                        recorder.submit(detection);
                        emit(&detection);
                        report.detections.push(detection);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            self.tick(now);
            for outcome in recorder.completed() {
                self.apply_outcome(&outcome);
                report.outcomes.push(outcome);
            }
        }

        debug!("sample stream closed, waiting for pending records");
        for outcome in recorder.finish() {
            self.apply_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        let (accel, gyro, ignored) = self.ingestor.counts();
        report.accel_samples = accel;
        report.gyro_samples = gyro;
        report.ignored = ignored;
        report
    }

    // Raw values change every sample; print them at most once per interval.
    fn show_raw(&mut self, now_ms: u64) {
        if self.raw_interval_ms == 0 {
            return;
        }
        let due = match self.last_raw_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.raw_interval_ms,
            None => true,
        };
        if due {
            self.last_raw_ms = Some(now_ms);
            info!("{}", self.board.raw_text());
        }
    }
}
