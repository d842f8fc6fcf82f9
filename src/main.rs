// Replays a recorded detection script through the tracking engine.
//
// Each line of the script is one camera frame:
//   {"at_secs": 0.1, "detections": [{"confidence": 0.9,
//     "bounding_box": {"x": 10, "y": 20, "width": 50, "height": 120}}]}
// (shown wrapped; the script itself has one JSON object per line).
// Raw multi-class model output can be given as `"predictions"` (class, score,
// bounding_box); only confident people are kept. A frame whose detector
// failed carries `"error": "message"` instead.

use anyhow::{Context, Result};
use image::RgbaImage;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vigil_vision::core_modules::alert::ConsoleAlertSink;
use vigil_vision::core_modules::detection::{
    Detection, DetectionAdapter, RawPrediction, person_detections,
};
use vigil_vision::{DetectionError, Frame, FrameReport, MonitorConfig, MonitorPipeline};

#[derive(Debug, Deserialize)]
struct ScriptFrame {
    at_secs: f64,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    predictions: Vec<RawPrediction>,
    #[serde(default)]
    error: Option<String>,
}

/// Hands the pipeline whatever the current script line recorded.
#[derive(Default)]
struct ReplayDetector {
    pending: Option<Result<Vec<Detection>, DetectionError>>,
}

impl DetectionAdapter for ReplayDetector {
    fn is_ready(&self) -> bool {
        true
    }

    fn detect(&mut self, _frame: &RgbaImage) -> Result<Vec<Detection>, DetectionError> {
        self.pending.take().unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: vigil_vision <detections.jsonl> [config.json]");
        return Ok(());
    }
    let config = match args.get(2) {
        Some(path) => MonitorConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => MonitorConfig::default(),
    };
    let script = File::open(&args[1]).with_context(|| format!("failed to open {}", args[1]))?;
    info!(?config, "Replaying detection script");

    // --- 2. Pipeline Initialization ---
    let started = Instant::now();
    let mut pipeline = MonitorPipeline::new(config, ConsoleAlertSink, started);
    let mut detector = ReplayDetector::default();
    let blank = RgbaImage::new(1, 1);
    let mut alerts = 0usize;

    // --- 3. Main Processing Loop ---
    for (index, line) in BufReader::new(script).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ScriptFrame = serde_json::from_str(&line)
            .with_context(|| format!("malformed script line {}", index + 1))?;

        detector.pending = Some(match entry.error {
            Some(message) => Err(DetectionError::Inference(message)),
            None => {
                let floor = pipeline.config().confidence_floor;
                let mut detections = entry.detections;
                detections.extend(person_detections(&entry.predictions, floor));
                Ok(detections)
            }
        });
        let offset = Duration::try_from_secs_f64(entry.at_secs.max(0.0)).unwrap_or_default();
        let frame = Frame::new(blank.clone(), started + offset);

        if let FrameReport::Processed(summary) = pipeline.process_frame(&mut detector, &frame) {
            let counts = summary.snapshot.counts();
            alerts += summary.alerts.len();
            info!(
                frame = index + 1,
                total = counts.total,
                active = counts.active,
                inactive = counts.inactive,
                "Frame processed"
            );
            for person in summary.snapshot.persons() {
                debug!(
                    id = %person.id,
                    active = person.is_active,
                    active_secs = person.active_time.as_secs_f64(),
                    inactive_secs = person.inactive_time.as_secs_f64(),
                    alert = person.alert_triggered,
                    "Person"
                );
            }
        }
    }

    // --- 4. Shutdown ---
    pipeline.stop();
    info!(alerts, "Replay finished");
    Ok(())
}
