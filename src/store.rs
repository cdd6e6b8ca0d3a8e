/// Append-only hazard persistence.
///
/// The remote store is a Firebase-style Realtime Database spoken to over its
/// REST interface: `POST <root>/<collection>.json` appends a child under a
/// server-generated key and answers `{"name": "<key>"}`. A JSON-lines file
/// stands in when no database is configured.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{StoreConfig, StoreKind};
use crate::detector::{Detection, HazardKind};
use crate::location::Position;

/// The persisted shape of a hazard. Exactly these four fields go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardRecord {
    #[serde(rename = "type")]
    pub kind: HazardKind,
    pub latitude: f64,
    pub longitude: f64,
    /// Epoch milliseconds at detection time, not at write time.
    pub timestamp: u64,
}

impl HazardRecord {
    pub fn new(detection: &Detection, position: Position) -> Self {
        Self {
            kind: detection.kind,
            latitude: position.latitude,
            longitude: position.longitude,
            timestamp: detection.timestamp_ms,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// `url` is the credential-free endpoint; the source error carries no URL.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store is not configured: {0}")]
    Config(String),
}

pub trait HazardStore: Send {
    /// Append `record` under `collection`, returning the generated key.
    fn push(&self, collection: &str, record: &HazardRecord) -> Result<String, StoreError>;

    /// Overwrite the value at `path`.
    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError>;

    /// Where a person can browse what has been written.
    fn console_url(&self) -> String;
}

// ── Realtime Database ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

pub struct RealtimeDb {
    http_client: reqwest::blocking::Client,
    base_url: String,
    auth: Option<String>,
}

impl RealtimeDb {
    pub fn new(base_url: &str, auth: Option<String>, timeout_secs: u64) -> Result<Self, StoreError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|source| StoreError::Http {
                url: base_url.clone(),
                source: source.without_url(),
            })?;

        Ok(Self {
            http_client,
            base_url,
            auth,
        })
    }

    /// Endpoint for `path` without credentials, safe to log.
    fn display_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request_url(&self, path: &str) -> String {
        let url = self.display_url(path);
        match &self.auth {
            Some(token) => format!("{url}?auth={token}"),
            None => url,
        }
    }

    fn check(
        &self,
        path: &str,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(StoreError::Status {
            url: self.display_url(path),
            status: status.as_u16(),
            body: response
                .text()
                .unwrap_or_else(|_| "<no body>".to_string()),
        })
    }
}

impl HazardStore for RealtimeDb {
    fn push(&self, collection: &str, record: &HazardRecord) -> Result<String, StoreError> {
        let http_err = |source: reqwest::Error| StoreError::Http {
            url: self.display_url(collection),
            source: source.without_url(),
        };

        let response = self
            .http_client
            .post(self.request_url(collection))
            .json(record)
            .send()
            .map_err(http_err)?;
        let response = self.check(collection, response)?;
        let body: PushResponse = response.json().map_err(http_err)?;
        Ok(body.name)
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let response = self
            .http_client
            .put(self.request_url(path))
            .json(value)
            .send()
            .map_err(|source: reqwest::Error| StoreError::Http {
                url: self.display_url(path),
                source: source.without_url(),
            })?;
        self.check(path, response)?;
        Ok(())
    }

    fn console_url(&self) -> String {
        format!("{}/", self.base_url)
    }
}

// ── JSON-lines file ─────────────────────────────────────────────────────────

pub struct JsonlStore {
    path: PathBuf,
    seq: AtomicU64,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seq: AtomicU64::new(0),
        }
    }

    fn append(&self, line: &Value) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let mut text = serde_json::to_string(line)?;
        text.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(text.as_bytes()).map_err(io_err)
    }
}

impl HazardStore for JsonlStore {
    fn push(&self, collection: &str, record: &HazardRecord) -> Result<String, StoreError> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}-{:04}", record.timestamp, n);
        self.append(&json!({
            "collection": collection,
            "key": key,
            "record": record,
        }))?;
        Ok(key)
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.append(&json!({ "path": path, "value": value }))
    }

    fn console_url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

pub fn build(config: &StoreConfig) -> Result<Box<dyn HazardStore>, StoreError> {
    match config.kind {
        StoreKind::Jsonl => Ok(Box::new(JsonlStore::new(&config.path))),
        StoreKind::RealtimeDb => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::Config("realtime_db requires a url".into()))?;
            Ok(Box::new(RealtimeDb::new(
                url,
                config.auth.clone(),
                config.timeout_secs,
            )?))
        }
    }
}
