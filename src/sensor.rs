/// Motion sensor reader for the Termux sensor bridge.
///
/// `termux-sensor` prints one JSON object per delivery, keyed by sensor name and
/// pretty-printed across several lines:
///
/// ```text
/// {
///   "LSM6DSO Accelerometer": { "values": [ 0.12, 9.78, 0.40 ] },
///   "LSM6DSO Gyroscope": { "values": [ 0.01, -0.02, 0.00 ] }
/// }
/// ```
///
/// Recorded sessions in the same format replay from a file or stdin.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SensorConfig;

// ── Constants ───────────────────────────────────────────────────────────────

const ACCEL_KEY: &str = "Accelerometer";
const GYRO_KEY: &str = "Gyroscope";

// A partial object this large is garbage, not a slow writer.
const MAX_OBJECT_BYTES: usize = 4096;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Accelerometer,
    Gyroscope,
}

impl Channel {
    fn from_sensor_name(name: &str) -> Option<Self> {
        if name.contains(ACCEL_KEY) {
            Some(Channel::Accelerometer)
        } else if name.contains(GYRO_KEY) {
            Some(Channel::Gyroscope)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub channel: Channel,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Where samples come from. Deserializes from `"termux"`, `"stdin"` / `"-"`,
/// or any other string as a replay file path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Source {
    Termux,
    Stdin,
    File(PathBuf),
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Source::from(s.as_str())
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        match s {
            "termux" => Source::Termux,
            "stdin" | "-" => Source::Stdin,
            path => Source::File(PathBuf::from(path)),
        }
    }
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("failed to spawn termux-sensor: {0} (is termux-api installed?)")]
    Spawn(#[source] io::Error),
    #[error("termux-sensor did not expose stdout")]
    NoStdout,
    #[error("failed to open sensor replay {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sensor stream read failed: {0}")]
    Read(#[from] io::Error),
}

// ── JSON object framing ─────────────────────────────────────────────────────

/// Accumulates lines until the braces balance into one complete object.
/// Braces inside string literals, such as a sensor name, do not count.
#[derive(Debug, Default)]
pub struct ObjectAssembler {
    buf: String,
    depth: i32,
    in_string: bool,
    escaped: bool,
}

impl ObjectAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns the object text once it is complete.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        for ch in trimmed.chars() {
            if self.in_string {
                match ch {
                    _ if self.escaped => self.escaped = false,
                    '\\' => self.escaped = true,
                    '"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => self.depth -= 1,
                _ => {}
            }
        }

        if !self.buf.is_empty() {
            self.buf.push(' ');
        }
        self.buf.push_str(trimmed);

        if self.depth < 0 || self.buf.len() > MAX_OBJECT_BYTES {
            warn!(
                bytes = self.buf.len(),
                "discarding malformed partial sensor object"
            );
            self.reset();
            return None;
        }

        if self.depth == 0 {
            let complete = self.buf.contains('{');
            let text = std::mem::take(&mut self.buf);
            if complete {
                return Some(text);
            }
        }
        None
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }
}

/// Extract every usable reading from one sensor object. Unknown sensors and
/// readings with fewer than three numeric values are skipped.
///
/// Gyroscope readings come first so the accelerometer reading, which drives
/// evaluation, sees the rotation rate delivered alongside it.
pub fn parse_object(text: &str) -> Vec<Sample> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "skipping unparseable sensor object");
            return Vec::new();
        }
    };

    let Some(obj) = value.as_object() else {
        return Vec::new();
    };

    let mut samples: Vec<Sample> = obj
        .iter()
        .filter_map(|(name, reading)| {
            let channel = Channel::from_sensor_name(name)?;
            let values = reading.get("values")?.as_array()?;
            if values.len() < 3 {
                return None;
            }
            Some(Sample {
                channel,
                x: values[0].as_f64()?,
                y: values[1].as_f64()?,
                z: values[2].as_f64()?,
            })
        })
        .collect();
    samples.sort_by_key(|s| s.channel == Channel::Accelerometer);
    samples
}

// ── Stream pump ─────────────────────────────────────────────────────────────

/// Read objects from `reader` and forward samples until EOF or until the
/// receiving side hangs up. Returns the number of samples sent.
fn pump<R: BufRead>(
    reader: R,
    tx: &mpsc::Sender<Sample>,
    gyroscope: bool,
    pace: Option<Duration>,
) -> Result<u64, SensorError> {
    let mut assembler = ObjectAssembler::new();
    let mut sent = 0u64;

    for line in reader.lines() {
        let Some(object) = assembler.push_line(&line?) else {
            continue;
        };

        for sample in parse_object(&object) {
            if !gyroscope && sample.channel == Channel::Gyroscope {
                continue;
            }
            if tx.send(sample).is_err() {
                return Ok(sent);
            }
            sent += 1;
        }

        if let Some(pace) = pace {
            thread::sleep(pace);
        }
    }

    Ok(sent)
}

fn sensor_list(gyroscope: bool) -> &'static str {
    if gyroscope {
        "Accelerometer,Gyroscope"
    } else {
        "Accelerometer"
    }
}

// ── Public API ──────────────────────────────────────────────────────────────

/// Start reading motion samples and send them through `tx`. Blocks until the
/// source is exhausted (replay) or the receiver is dropped.
///
/// Must be called from a dedicated thread.
pub fn start(config: &SensorConfig, tx: mpsc::Sender<Sample>) -> Result<u64, SensorError> {
    let delay = Duration::from_millis(config.delay_ms as u64);

    match &config.source {
        Source::Termux => {
            // Release any listener left registered by a previous run.
            let _ = Command::new("termux-sensor").arg("-c").output();

            let mut child = Command::new("termux-sensor")
                .arg("-s")
                .arg(sensor_list(config.gyroscope))
                .arg("-d")
                .arg(config.delay_ms.to_string())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(SensorError::Spawn)?;

            let stdout = child.stdout.take().ok_or(SensorError::NoStdout)?;
            info!(
                sensors = sensor_list(config.gyroscope),
                delay_ms = config.delay_ms,
                "termux-sensor active"
            );

            let result = pump(BufReader::new(stdout), &tx, config.gyroscope, None);
            let _ = child.kill();
            let _ = child.wait();
            result
        }
        Source::Stdin => {
            info!("reading sensor objects from stdin");
            pump(io::stdin().lock(), &tx, config.gyroscope, None)
        }
        Source::File(path) => {
            let file = File::open(path).map_err(|source| SensorError::Open {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "replaying sensor recording");
            pump(BufReader::new(file), &tx, config.gyroscope, Some(delay))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRETTY: &str = r#"{
  "LSM6DSO Accelerometer": {
    "values": [
      0.5,
      14.0,
      1.25
    ]
  },
  "LSM6DSO Gyroscope": {
    "values": [
      3.0,
      0.0,
      4.0
    ]
  }
}"#;

    fn assemble(text: &str) -> Vec<String> {
        let mut asm = ObjectAssembler::new();
        text.lines().filter_map(|l| asm.push_line(l)).collect()
    }

    #[test]
    fn pretty_printed_object_is_framed_once() {
        let objects = assemble(PRETTY);
        assert_eq!(objects.len(), 1);

        let samples = parse_object(&objects[0]);
        assert_eq!(samples.len(), 2);
        let accel = samples
            .iter()
            .find(|s| s.channel == Channel::Accelerometer)
            .unwrap();
        assert_eq!((accel.x, accel.y, accel.z), (0.5, 14.0, 1.25));
        let gyro = samples
            .iter()
            .find(|s| s.channel == Channel::Gyroscope)
            .unwrap();
        assert_eq!((gyro.x, gyro.y, gyro.z), (3.0, 0.0, 4.0));
    }

    #[test]
    fn gyroscope_is_delivered_before_accelerometer() {
        let objects = assemble(PRETTY);
        let channels: Vec<Channel> = parse_object(&objects[0]).iter().map(|s| s.channel).collect();
        assert_eq!(channels, [Channel::Gyroscope, Channel::Accelerometer]);
    }

    #[test]
    fn single_line_objects_back_to_back() {
        let text = concat!(
            r#"{"BMI160 Accelerometer": {"values": [0, 0, 9.8]}}"#,
            "\n",
            r#"{"BMI160 Accelerometer": {"values": [0, 0, 25]}}"#,
            "\n",
        );
        let objects = assemble(text);
        assert_eq!(objects.len(), 2);
        assert_eq!(parse_object(&objects[1])[0].z, 25.0);
    }

    #[test]
    fn unknown_sensors_and_short_readings_are_skipped() {
        let text = r#"{"Light": {"values": [120.0]}, "X Accelerometer": {"values": [1.0, 2.0]}, "Y Gyroscope": {"values": ["a", 1, 2]}}"#;
        assert!(parse_object(text).is_empty());
        assert!(parse_object("not json").is_empty());
        assert!(parse_object("[1, 2, 3]").is_empty());
    }

    #[test]
    fn oversized_partial_object_is_discarded() {
        let mut asm = ObjectAssembler::new();
        assert!(asm.push_line("{").is_none());
        let filler = format!("\"junk\": \"{}\",", "x".repeat(MAX_OBJECT_BYTES));
        assert!(asm.push_line(&filler).is_none());
        // Framing recovers on the next complete object.
        let next = asm.push_line(r#"{"A Accelerometer": {"values": [1, 2, 3]}}"#);
        assert!(next.is_some());
    }

    #[test]
    fn stray_closing_brace_resets_framing() {
        let mut asm = ObjectAssembler::new();
        assert!(asm.push_line("}").is_none());
        assert!(asm
            .push_line(r#"{"A Accelerometer": {"values": [1, 2, 3]}}"#)
            .is_some());
    }

    #[test]
    fn braces_inside_sensor_names_do_not_break_framing() {
        let text = concat!(
            "{\n",
            r#"  "Vendor {v2} Accelerometer": { "values": [ 0.0, 0.0, 25.0 ] },"#,
            "\n",
            r#"  "Quoted \"}\" Gyroscope": { "values": [ 3.0, 0.0, 4.0 ] }"#,
            "\n",
            "}\n",
        );
        let objects = assemble(text);
        assert_eq!(objects.len(), 1);

        let samples = parse_object(&objects[0]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].channel, Channel::Accelerometer);
        assert_eq!(samples[1].z, 25.0);
    }

    #[test]
    fn pump_drops_gyroscope_in_accelerometer_only_mode() {
        let (tx, rx) = mpsc::channel();
        let sent = pump(io::Cursor::new(PRETTY), &tx, false, None).unwrap();
        assert_eq!(sent, 1);
        drop(tx);
        let all: Vec<Sample> = rx.iter().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].channel, Channel::Accelerometer);
    }

    #[test]
    fn pump_stops_quietly_when_receiver_is_gone() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sent = pump(io::Cursor::new(PRETTY), &tx, true, None).unwrap();
        assert_eq!(sent, 0);
    }

    #[test]
    fn source_from_str() {
        assert_eq!(Source::from("termux"), Source::Termux);
        assert_eq!(Source::from("-"), Source::Stdin);
        assert_eq!(Source::from("stdin"), Source::Stdin);
        assert_eq!(
            Source::from("rides/monday.json"),
            Source::File(PathBuf::from("rides/monday.json"))
        );
    }
}
