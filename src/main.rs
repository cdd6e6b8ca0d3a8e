use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use roadhazard::broadcast::Broadcaster;
use roadhazard::config::{Config, LocationKind, StoreKind};
use roadhazard::sensor::{self, Source};
use roadhazard::{location, now_ms, store};
use roadhazard::{Classifier, Monitor, Recorder};

#[derive(Parser, Debug)]
#[command(name = "roadhazard")]
#[command(about = "Detect potholes and speed breakers from phone motion sensors", long_about = None)]
struct Args {
    /// YAML config file (all keys optional)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Sample source: termux, stdin (or -), or a recording to replay
    #[arg(long)]
    source: Option<String>,

    /// Accelerometer only (disables speed-breaker detection)
    #[arg(long)]
    no_gyro: bool,

    /// Realtime Database root URL; switches the store to realtime_db
    #[arg(long, value_name = "URL")]
    db_url: Option<String>,

    /// Database auth token
    #[arg(long, env = "ROADHAZARD_DB_AUTH", hide_env_values = true)]
    db_auth: Option<String>,

    /// Collection that hazard records are appended under
    #[arg(long)]
    collection: Option<String>,

    /// Append records to this JSON-lines file instead of a database
    #[arg(long, value_name = "FILE", conflicts_with = "db_url")]
    jsonl: Option<PathBuf>,

    /// Location provider: termux, fixed, none
    #[arg(long, value_parser = ["termux", "fixed", "none"])]
    location: Option<String>,

    /// Latitude for --location fixed
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude for --location fixed
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Subscriber socket path
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Do not open the subscriber socket
    #[arg(long, conflicts_with = "socket")]
    no_socket: bool,

    /// Skip the startup test write
    #[arg(long)]
    no_probe: bool,

    /// Log filter, e.g. "roadhazard=debug" (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.sensor.source = Source::from(source.as_str());
        }
        if self.no_gyro {
            config.sensor.gyroscope = false;
        }
        if let Some(url) = &self.db_url {
            config.store.kind = StoreKind::RealtimeDb;
            config.store.url = Some(url.clone());
        }
        if let Some(auth) = &self.db_auth {
            config.store.auth = Some(auth.clone());
        }
        if let Some(collection) = &self.collection {
            config.store.collection = collection.clone();
        }
        if let Some(path) = &self.jsonl {
            config.store.kind = StoreKind::Jsonl;
            config.store.path = path.clone();
        }
        match self.location.as_deref() {
            Some("termux") => config.location.provider = LocationKind::Termux,
            Some("fixed") => config.location.provider = LocationKind::Fixed,
            Some("none") => config.location.provider = LocationKind::None,
            _ => {}
        }
        if self.lat.is_some() {
            config.location.latitude = self.lat;
        }
        if self.lon.is_some() {
            config.location.longitude = self.lon;
        }
        if let Some(socket) = &self.socket {
            config.feedback.socket = Some(socket.clone());
        }
        if self.no_socket {
            config.feedback.socket = None;
        }
        if self.no_probe {
            config.store.probe = false;
        }
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roadhazard=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let classifier = Classifier::new(config.thresholds)?;
    let t = classifier.thresholds();
    info!(
        "thresholds: pothole>{:.1} speed_breaker=({:.1},{:.1}) rotation>{:.1} cooldown={}ms gyro={}",
        t.pothole,
        t.speed_breaker_min,
        t.speed_breaker_max,
        t.rotation,
        t.cooldown_ms,
        config.sensor.gyroscope,
    );

    let store = store::build(&config.store).context("failed to set up hazard store")?;
    info!("records go to {} (collection {:?})", store.console_url(), config.store.collection);
    if config.store.probe {
        match store.set("test", &json!("Hello from roadhazard!")) {
            Ok(()) => info!("store reachable"),
            Err(e) => warn!(error = %e, "startup test write failed, continuing"),
        }
    }

    let location = location::build(&config.location)?;
    info!(provider = location.name(), "location provider ready");

    let recorder = Recorder::spawn(location, store, config.store.collection.clone())
        .context("failed to start recorder thread")?;

    let broadcaster = match &config.feedback.socket {
        Some(path) => {
            let b = Broadcaster::bind(path)
                .with_context(|| format!("failed to bind socket {}", path.display()))?;
            info!("subscribers can connect at {}", b.path().display());
            Some(b)
        }
        None => None,
    };

    // Start sensor on dedicated thread
    let (tx, rx) = mpsc::channel();
    let sensor_config = config.sensor.clone();
    let sensor_thread = thread::Builder::new()
        .name("sensor".into())
        .spawn(move || sensor::start(&sensor_config, tx))
        .context("failed to start sensor thread")?;

    info!("waiting for hazards... (ctrl+c to quit)");

    let mut monitor = Monitor::new(classifier, &config.feedback);
    let report = monitor.run(&rx, recorder, now_ms, |detection| {
        match serde_json::to_string(detection) {
            Ok(line) => {
                println!("{line}");
                std::io::stdout().flush().ok();
                if let Some(b) = &broadcaster {
                    b.send(&line);
                }
            }
            Err(e) => error!(error = %e, "failed to encode detection"),
        }
    });

    info!(
        "sensor stream ended: {} accel, {} gyro, {} ignored samples, {} hazards, {} records",
        report.accel_samples,
        report.gyro_samples,
        report.ignored,
        report.detections.len(),
        report.outcomes.len(),
    );
    info!("final status:\n{}", monitor.board().render());

    match sensor_thread.join() {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e).context("sensor stream failed"),
        Err(_) => Err(anyhow!("sensor thread panicked")),
    }
}
