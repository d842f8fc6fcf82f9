// THEORY:
// The `session` module runs a `MonitorPipeline` as a background tokio task for
// hosts whose detector is asynchronous (a remote model, a GPU queue).
//
// Key architectural principles:
// 1.  **One Cycle in Flight**: The task takes a frame, awaits its detection,
//     applies it, and only then takes the next frame. Frames that arrive in
//     the meantime wait in a bounded channel, so a slow model slows the
//     producer down instead of piling up overlapping cycles.
// 2.  **Snapshot Broadcast**: Every completed cycle publishes its snapshot on a
//     `watch` channel. Readers always get the latest complete generation and
//     never one being rebuilt.
// 3.  **Live Configuration**: Config updates travel on their own `watch`
//     channel and are read at the start of every cycle.
// 4.  **Clean Stop**: Stopping drops every track and shuts the alert sink down.
//     Nothing survives into the next session.

use crate::config::MonitorConfig;
use crate::core_modules::alert::AlertSink;
use crate::core_modules::detection::AsyncDetectionAdapter;
use crate::core_modules::track_store::Snapshot;
use crate::error::{DetectionError, MonitorError, Result};
use crate::pipeline::{Frame, MonitorPipeline};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const DEFAULT_FRAME_QUEUE: usize = 4;

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_received: u64,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub alerts: u64,
}

/// Handle to a running monitoring session.
pub struct MonitorSession {
    frames_tx: mpsc::Sender<Frame>,
    config_tx: watch::Sender<MonitorConfig>,
    stop_tx: watch::Sender<bool>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    task: JoinHandle<SessionSummary>,
}

impl MonitorSession {
    /// Spawns the session task on the current tokio runtime.
    pub fn spawn<D, S>(pipeline: MonitorPipeline<S>, detector: D) -> Self
    where
        D: AsyncDetectionAdapter,
        S: AlertSink + Send + 'static,
    {
        Self::spawn_with_queue(pipeline, detector, DEFAULT_FRAME_QUEUE)
    }

    pub fn spawn_with_queue<D, S>(pipeline: MonitorPipeline<S>, detector: D, queue: usize) -> Self
    where
        D: AsyncDetectionAdapter,
        S: AlertSink + Send + 'static,
    {
        let (frames_tx, frames_rx) = mpsc::channel::<Frame>(queue.max(1));
        let (config_tx, config_rx) = watch::channel(pipeline.config().clone());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (snapshot_tx, snapshots) = watch::channel(pipeline.snapshot());

        let task = tokio::spawn(run(
            pipeline,
            detector,
            frames_rx,
            config_rx,
            stop_rx,
            snapshot_tx,
        ));
        info!("Monitoring session started");

        Self {
            frames_tx,
            config_tx,
            stop_tx,
            snapshots,
            task,
        }
    }

    /// Queues a frame, waiting while the queue is full.
    pub async fn submit(&self, frame: Frame) -> Result<()> {
        self.frames_tx
            .send(frame)
            .await
            .map_err(|_| MonitorError::SessionClosed)
    }

    /// Replaces the configuration; the next cycle uses it.
    pub fn update_config(&self, config: MonitorConfig) -> Result<()> {
        self.config_tx
            .send(config)
            .map_err(|_| MonitorError::SessionClosed)
    }

    /// A receiver that is notified whenever a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Stops the session after the cycle in flight, if any, completes.
    /// Frames still queued are discarded.
    pub async fn stop(self) -> Result<SessionSummary> {
        // The task may already be gone; joining below reports that.
        let _ = self.stop_tx.send(true);
        drop(self.frames_tx);
        self.task
            .await
            .map_err(|e| MonitorError::SessionTask(e.to_string()))
    }
}

async fn run<D, S>(
    mut pipeline: MonitorPipeline<S>,
    mut detector: D,
    mut frames_rx: mpsc::Receiver<Frame>,
    config_rx: watch::Receiver<MonitorConfig>,
    mut stop_rx: watch::Receiver<bool>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
) -> SessionSummary
where
    D: AsyncDetectionAdapter,
    S: AlertSink + Send + 'static,
{
    let mut summary = SessionSummary::default();

    loop {
        let frame = tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }
            frame = frames_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        summary.frames_received += 1;

        pipeline.set_config(config_rx.borrow().clone());

        if !detector.is_ready() || !pipeline.admit_frame() {
            continue;
        }

        summary.cycles += 1;
        let (width, height) = frame.image.dimensions();
        if width == 0 || height == 0 {
            summary.failed_cycles += 1;
            pipeline.detection_failed(DetectionError::InvalidFrame { width, height });
            continue;
        }
        match detector.detect(&frame.image).await {
            Ok(detections) => {
                let cycle = pipeline.apply_detections(&detections, frame.timestamp);
                summary.alerts += cycle.alerts.len() as u64;
                snapshot_tx.send_replace(cycle.snapshot);
            }
            Err(error) => {
                summary.failed_cycles += 1;
                pipeline.detection_failed(error);
            }
        }
    }

    let cleared = pipeline.stop();
    snapshot_tx.send_replace(cleared);
    debug!(?summary, "Monitoring session finished");
    summary
}
