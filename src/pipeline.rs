// THEORY:
// The `pipeline` module is the top-level API of the engine. It encapsulates the
// whole stack (sampling, association, activity, publication, alerting) behind
// a single `process_frame` call that a camera loop can drive.
//
// Its purpose is to give the driver a clean entry point: hand in a frame, get
// back a report that always carries a usable snapshot, whatever happened.
//
// Stages of a frame:
// 1.  **Readiness**: a stopped pipeline or a detector that is not ready yet
//     leaves everything untouched. An empty image never reaches the model.
// 2.  **Sampling**: only every `frame_stride`-th frame runs detection; the
//     others return the previous snapshot.
// 3.  **Detection**: a failed detection keeps the previous snapshot. A flaky
//     model must not look like everyone left the room.
// 4.  **Tracking**: the tracker builds the next generation using the wall-clock
//     time since the previous processed frame, and alerts fire synchronously.
// 5.  **Publication**: the new generation replaces the old one atomically.

use crate::config::MonitorConfig;
use crate::core_modules::alert::AlertSink;
use crate::core_modules::detection::{Detection, DetectionAdapter};
use crate::core_modules::track_store::{Snapshot, TrackStore};
use crate::core_modules::tracker::{Tracker, UpdateStats};
use crate::error::DetectionError;
use image::RgbaImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::activity::{ActivityState, TrackId, TrackedPerson};
pub use crate::core_modules::alert::InactivityAlert;
pub use crate::core_modules::track_store::PersonCounts;

/// A camera frame together with the moment it was captured.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(image: RgbaImage, timestamp: Instant) -> Self {
        Self { image, timestamp }
    }
}

/// What happened during one processed cycle.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub snapshot: Arc<Snapshot>,
    pub alerts: Vec<InactivityAlert>,
    pub stats: UpdateStats,
    /// Wall-clock time integrated into the activity timers.
    pub delta: Duration,
}

/// The outcome of handing one frame to the pipeline.
#[derive(Debug, Clone)]
pub enum FrameReport {
    /// The pipeline is stopped or the detector is not ready.
    Idle(Arc<Snapshot>),
    /// The frame fell between sampling points.
    Skipped(Arc<Snapshot>),
    Processed(CycleSummary),
    /// Detection failed; the previous snapshot is carried forward.
    DetectionFailed {
        error: DetectionError,
        snapshot: Arc<Snapshot>,
    },
}

impl FrameReport {
    /// The snapshot that is current after this frame.
    pub fn snapshot(&self) -> &Arc<Snapshot> {
        match self {
            FrameReport::Idle(snapshot) | FrameReport::Skipped(snapshot) => snapshot,
            FrameReport::Processed(summary) => &summary.snapshot,
            FrameReport::DetectionFailed { snapshot, .. } => snapshot,
        }
    }

    pub fn alerts(&self) -> &[InactivityAlert] {
        match self {
            FrameReport::Processed(summary) => &summary.alerts,
            _ => &[],
        }
    }
}

/// Counts frames and says which of them should run detection.
#[derive(Debug, Default, Clone)]
pub struct FrameSampler {
    frame_count: u64,
}

impl FrameSampler {
    /// Registers a frame; true on every `stride`-th call.
    pub fn should_process(&mut self, stride: u32) -> bool {
        self.frame_count += 1;
        self.frame_count % u64::from(stride.max(1)) == 0
    }

    pub fn reset(&mut self) {
        self.frame_count = 0;
    }
}

/// The main, top-level struct for the tracking engine.
pub struct MonitorPipeline<S: AlertSink> {
    config: MonitorConfig,
    tracker: Tracker,
    store: Arc<TrackStore>,
    sink: S,
    sampler: FrameSampler,
    /// Reference point for the next cycle's time delta.
    last_update: Instant,
    running: bool,
}

impl<S: AlertSink> MonitorPipeline<S> {
    /// Creates a running pipeline whose first time delta is measured from `started_at`.
    pub fn new(config: MonitorConfig, sink: S, started_at: Instant) -> Self {
        let config = config.sanitized();
        Self {
            tracker: Tracker::new(config.confidence_floor),
            config,
            store: Arc::new(TrackStore::new()),
            sink,
            sampler: FrameSampler::default(),
            last_update: started_at,
            running: true,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Replaces the configuration. Takes effect on the next cycle.
    pub fn set_config(&mut self, config: MonitorConfig) {
        let config = config.sanitized();
        if config != self.config {
            debug!(?config, "Configuration updated");
        }
        self.tracker.set_confidence_floor(config.confidence_floor);
        self.config = config;
    }

    /// Shared handle for readers of the latest snapshot.
    pub fn store(&self) -> Arc<TrackStore> {
        Arc::clone(&self.store)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Resumes monitoring after a stop. Tracking restarts from an empty store.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        if !self.store.current().is_empty() {
            self.store.clear();
        }
        self.sampler.reset();
        self.last_update = now;
        self.running = true;
        info!("Monitoring started");
    }

    /// Stops monitoring, dropping every track and releasing alert resources.
    pub fn stop(&mut self) -> Arc<Snapshot> {
        self.running = false;
        self.sampler.reset();
        self.sink.shutdown();
        let cleared = self.store.clear();
        info!("Monitoring stopped");
        cleared
    }

    /// Counts the frame and decides whether it runs a cycle.
    pub fn admit_frame(&mut self) -> bool {
        self.running && self.sampler.should_process(self.config.frame_stride)
    }

    /// Runs the whole stack for one frame using a synchronous detector.
    pub fn process_frame<D: DetectionAdapter + ?Sized>(
        &mut self,
        detector: &mut D,
        frame: &Frame,
    ) -> FrameReport {
        if !self.running || !detector.is_ready() {
            return FrameReport::Idle(self.store.current());
        }
        if !self.admit_frame() {
            return FrameReport::Skipped(self.store.current());
        }

        let (width, height) = frame.image.dimensions();
        if width == 0 || height == 0 {
            return self.detection_failed(DetectionError::InvalidFrame { width, height });
        }

        match detector.detect(&frame.image) {
            Ok(detections) => {
                FrameReport::Processed(self.apply_detections(&detections, frame.timestamp))
            }
            Err(error) => self.detection_failed(error),
        }
    }

    /// Records a failed detection cycle. The previous snapshot stays current
    /// and the time reference does not move.
    pub fn detection_failed(&mut self, error: DetectionError) -> FrameReport {
        warn!(error = %error, "Detection failed; keeping previous snapshot");
        FrameReport::DetectionFailed {
            error,
            snapshot: self.store.current(),
        }
    }

    /// Runs association and the activity state machine on one processed
    /// frame's detections, then publishes the result.
    ///
    /// A stopped pipeline ignores the detections: nothing is tracked, no alert
    /// reaches the sink and the summary carries the current snapshot.
    pub fn apply_detections(
        &mut self,
        detections: &[Detection],
        timestamp: Instant,
    ) -> CycleSummary {
        if !self.running {
            debug!(ignored = detections.len(), "Pipeline stopped; detections ignored");
            return CycleSummary {
                snapshot: self.store.current(),
                alerts: Vec::new(),
                stats: UpdateStats::default(),
                delta: Duration::ZERO,
            };
        }

        let delta = timestamp.saturating_duration_since(self.last_update);
        self.last_update = timestamp;

        let params = self.config.activity_params();
        let previous = self.store.current();
        let update = self
            .tracker
            .update(previous.persons(), detections, delta, &params, &mut self.sink);

        let snapshot = self.store.publish(update.persons);
        debug!(
            generation = snapshot.generation(),
            tracked = snapshot.len(),
            delta_ms = delta.as_millis() as u64,
            "Snapshot published"
        );

        CycleSummary {
            snapshot,
            alerts: update.alerts,
            stats: update.stats,
            delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::alert::{MockAlertSink, RecordingSink};
    use crate::core_modules::detection::MockDetectionAdapter;
    use crate::core_modules::geometry::BoundingBox;

    const STEP: Duration = Duration::from_millis(100);

    fn config() -> MonitorConfig {
        MonitorConfig {
            sensitivity: 50,
            inactivity_threshold_secs: 1.0,
            frame_stride: 1,
            ..MonitorConfig::default()
        }
    }

    fn at(x: f64) -> Detection {
        Detection::new(BoundingBox::new(x, 100.0, 60.0, 160.0), 0.9)
    }

    fn frame(timestamp: Instant) -> Frame {
        Frame::new(RgbaImage::new(4, 4), timestamp)
    }

    #[test]
    fn sampler_admits_every_nth_frame() {
        let mut sampler = FrameSampler::default();
        let admitted: Vec<bool> = (0..7).map(|_| sampler.should_process(3)).collect();
        assert_eq!(admitted, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn inactivity_scenario_fires_on_the_tenth_still_frame() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(config(), RecordingSink::default(), t0);
        let mut now = t0;

        now += STEP;
        let first = pipeline.apply_detections(&[at(100.0)], now);
        let id = first.snapshot.persons()[0].id;

        // Moves 30px: active for one step.
        now += STEP;
        let moved = pipeline.apply_detections(&[at(130.0)], now);
        let person = moved.snapshot.get(id).expect("tracked");
        assert!(person.is_active);
        assert_eq!(person.active_time, STEP);
        assert!(person.inactive_time.is_zero());

        for still_frame in 1..=12 {
            now += STEP;
            let cycle = pipeline.apply_detections(&[at(130.0)], now);
            let person = cycle.snapshot.get(id).expect("tracked");
            assert!(!person.is_active);
            assert_eq!(person.alert_triggered, still_frame >= 10);
            assert_eq!(cycle.alerts.len(), usize::from(still_frame == 10));
        }
        assert_eq!(pipeline.sink().alerts().len(), 1);

        now += STEP;
        let resumed = pipeline.apply_detections(&[at(200.0)], now);
        let person = resumed.snapshot.get(id).expect("tracked");
        assert!(person.is_active);
        assert!(!person.alert_triggered);
    }

    #[test]
    fn skipped_frames_reuse_the_snapshot_and_delta_spans_them() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(
            MonitorConfig {
                frame_stride: 3,
                ..config()
            },
            RecordingSink::default(),
            t0,
        );
        let mut detector = MockDetectionAdapter::new();
        detector.expect_is_ready().return_const(true);
        detector.expect_detect().times(2).returning(|_| Ok(vec![at(100.0)]));

        let mut reports = Vec::new();
        for i in 1..=6u32 {
            reports.push(pipeline.process_frame(&mut detector, &frame(t0 + STEP * i)));
        }

        assert!(matches!(reports[0], FrameReport::Skipped(_)));
        assert!(matches!(reports[1], FrameReport::Skipped(_)));
        let FrameReport::Processed(first) = &reports[2] else {
            panic!("third frame should be processed");
        };
        assert_eq!(first.delta, STEP * 3);
        assert!(matches!(reports[3], FrameReport::Skipped(_)));
        assert_eq!(reports[3].snapshot().generation(), first.snapshot.generation());

        let FrameReport::Processed(second) = &reports[5] else {
            panic!("sixth frame should be processed");
        };
        assert_eq!(second.delta, STEP * 3);
        assert_eq!(second.snapshot.persons()[0].inactive_time, STEP * 3);
    }

    #[test]
    fn detection_failure_carries_the_previous_snapshot_forward() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(config(), RecordingSink::default(), t0);
        let mut detector = MockDetectionAdapter::new();
        detector.expect_is_ready().return_const(true);
        let mut calls = 0;
        detector.expect_detect().times(3).returning(move |_| {
            calls += 1;
            match calls {
                2 => Err(DetectionError::Inference("gpu hiccup".to_string())),
                _ => Ok(vec![at(100.0)]),
            }
        });

        let first = pipeline.process_frame(&mut detector, &frame(t0 + STEP));
        let failed = pipeline.process_frame(&mut detector, &frame(t0 + STEP * 2));
        let recovered = pipeline.process_frame(&mut detector, &frame(t0 + STEP * 3));

        let FrameReport::DetectionFailed { error, snapshot } = &failed else {
            panic!("expected a failed cycle");
        };
        assert_eq!(error, &DetectionError::Inference("gpu hiccup".to_string()));
        assert_eq!(snapshot.generation(), first.snapshot().generation());
        assert_eq!(snapshot.len(), 1);

        // The failed cycle did not move the time reference.
        let FrameReport::Processed(summary) = &recovered else {
            panic!("expected recovery");
        };
        assert_eq!(summary.delta, STEP * 2);
        assert_eq!(summary.snapshot.persons()[0].id, first.snapshot().persons()[0].id);
    }

    #[test]
    fn not_ready_detector_leaves_everything_untouched() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(config(), RecordingSink::default(), t0);
        let mut detector = MockDetectionAdapter::new();
        detector.expect_is_ready().return_const(false);
        detector.expect_detect().never();

        let report = pipeline.process_frame(&mut detector, &frame(t0 + STEP));
        assert!(matches!(report, FrameReport::Idle(_)));
        assert_eq!(report.snapshot().generation(), 0);
    }

    #[test]
    fn config_changes_apply_on_the_next_cycle() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(
            MonitorConfig {
                sensitivity: 1,
                ..config()
            },
            RecordingSink::default(),
            t0,
        );
        pipeline.apply_detections(&[at(100.0)], t0 + STEP);

        // 20px is below the 49.55px threshold at sensitivity 1.
        let still = pipeline.apply_detections(&[at(120.0)], t0 + STEP * 2);
        assert!(!still.snapshot.persons()[0].is_active);

        pipeline.set_config(MonitorConfig {
            sensitivity: 100,
            ..config()
        });
        let moving = pipeline.apply_detections(&[at(140.0)], t0 + STEP * 3);
        assert!(moving.snapshot.persons()[0].is_active);
    }

    #[test]
    fn stop_drops_tracks_and_shuts_the_sink_down() {
        let t0 = Instant::now();
        let mut sink = MockAlertSink::new();
        sink.expect_shutdown().times(1).return_const(());
        let mut pipeline = MonitorPipeline::new(config(), sink, t0);
        pipeline.apply_detections(&[at(100.0)], t0 + STEP);

        let cleared = pipeline.stop();
        assert!(cleared.is_empty());
        assert!(!pipeline.is_running());
        assert!(!pipeline.admit_frame());

        let mut detector = MockDetectionAdapter::new();
        detector.expect_is_ready().return_const(true);
        detector.expect_detect().never();
        assert!(matches!(
            pipeline.process_frame(&mut detector, &frame(t0 + STEP * 2)),
            FrameReport::Idle(_)
        ));
    }

    #[test]
    fn restart_begins_with_fresh_ids_and_timing() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(config(), RecordingSink::default(), t0);
        pipeline.apply_detections(&[at(100.0)], t0 + STEP);
        pipeline.stop();

        let restart = t0 + Duration::from_secs(60);
        pipeline.start(restart);
        let cycle = pipeline.apply_detections(&[at(100.0)], restart + STEP);

        assert_eq!(cycle.delta, STEP);
        assert_eq!(cycle.snapshot.persons()[0].id, TrackId(1));
        assert_eq!(cycle.stats.created, 1);
    }

    #[test]
    fn detections_applied_while_stopped_do_not_survive_a_restart() {
        let t0 = Instant::now();
        let mut sink = MockAlertSink::new();
        sink.expect_on_inactivity_alert().never();
        sink.expect_shutdown().times(1).return_const(());
        let mut pipeline = MonitorPipeline::new(config(), sink, t0);
        pipeline.apply_detections(&[at(100.0)], t0 + STEP);
        pipeline.stop();

        let ignored = pipeline.apply_detections(&[at(100.0)], t0 + Duration::from_secs(1));
        assert!(ignored.snapshot.is_empty());
        assert_eq!(ignored.stats, UpdateStats::default());
        assert!(pipeline.snapshot().is_empty());

        pipeline.start(t0 + Duration::from_secs(5));
        assert!(pipeline.is_running());
        assert!(pipeline.snapshot().is_empty());
    }

    #[test]
    fn start_discards_tracks_published_behind_its_back() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(config(), RecordingSink::default(), t0);
        pipeline.stop();
        pipeline.store().publish(vec![TrackedPerson::new(
            TrackId(42),
            BoundingBox::new(0.0, 0.0, 50.0, 100.0),
        )]);

        pipeline.start(t0 + STEP);
        assert!(pipeline.snapshot().is_empty());
    }

    #[test]
    fn empty_frame_is_reported_without_calling_the_detector() {
        let t0 = Instant::now();
        let mut pipeline = MonitorPipeline::new(config(), RecordingSink::default(), t0);
        let mut detector = MockDetectionAdapter::new();
        detector.expect_is_ready().return_const(true);
        detector.expect_detect().never();

        let report = pipeline.process_frame(&mut detector, &Frame::new(RgbaImage::new(0, 4), t0));
        let FrameReport::DetectionFailed { error, snapshot } = &report else {
            panic!("expected the frame to be rejected");
        };
        assert_eq!(error, &DetectionError::InvalidFrame { width: 0, height: 4 });
        assert_eq!(snapshot.generation(), 0);
    }
}
