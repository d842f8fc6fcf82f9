// THEORY:
// The `alert` module is where the engine's output leaves the building. The
// tracker decides *when* an alert fires; an `AlertSink` decides what firing
// means: a log line, a recorded event, or an audible alarm.
//
// Key architectural principles:
// 1.  **Fire and Forget**: Sinks are called synchronously inside the update
//     pass and cannot fail it. A sink that has trouble (a missing audio device)
//     logs and moves on.
// 2.  **Explicit Resources**: The audible alarm owns its output device through
//     an `AudioHandle`. The device is opened on the first alarm that is
//     actually played and closed on `shutdown`, so a muted or idle monitor
//     never touches audio hardware and nothing lives in a global.
// 3.  **Deterministic Sound**: The alarm is a fixed pattern of square-wave
//     beeps, rendered to PCM once and replayed for every alert.

use crate::core_modules::activity::{TrackId, TrackedPerson};
use crate::core_modules::geometry::BoundingBox;
use crate::error::AlertError;
use std::f32::consts::PI;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

/// Sample rate used when none is requested.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Peak gain of every beep.
const BEEP_GAIN: f32 = 0.5;
/// Length of the attack and release ramps.
const BEEP_RAMP_SECS: f32 = 0.02;

/// One tone in the alarm pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beep {
    /// Start offset from the beginning of the alarm.
    pub offset_secs: f32,
    pub frequency_hz: f32,
    pub duration_secs: f32,
}

impl Beep {
    pub const fn new(offset_secs: f32, frequency_hz: f32, duration_secs: f32) -> Self {
        Self {
            offset_secs,
            frequency_hz,
            duration_secs,
        }
    }
}

/// High, medium, high, medium, then a longer highest tone.
pub const ALARM_PATTERN: [Beep; 5] = [
    Beep::new(0.0, 1000.0, 0.15),
    Beep::new(0.2, 800.0, 0.15),
    Beep::new(0.4, 1000.0, 0.15),
    Beep::new(0.6, 800.0, 0.15),
    Beep::new(0.8, 1200.0, 0.25),
];

/// Raised when a person's inactive streak reaches the configured threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct InactivityAlert {
    pub track_id: TrackId,
    /// Length of the inactive streak when the alert fired.
    pub inactive_time: Duration,
    pub bounding_box: BoundingBox,
}

impl InactivityAlert {
    pub fn for_person(person: &TrackedPerson) -> Self {
        Self {
            track_id: person.id,
            inactive_time: person.inactive_time,
            bounding_box: person.bounding_box,
        }
    }
}

/// Receives inactivity alerts, at most once per inactivity episode per track.
#[cfg_attr(test, automock)]
pub trait AlertSink {
    fn on_inactivity_alert(&mut self, alert: &InactivityAlert);

    /// Releases anything the sink acquired. Called when monitoring stops.
    fn shutdown(&mut self) {}
}

/// Logs every alert through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAlertSink;

impl AlertSink for ConsoleAlertSink {
    fn on_inactivity_alert(&mut self, alert: &InactivityAlert) {
        warn!(
            track_id = %alert.track_id,
            inactive_secs = alert.inactive_time.as_secs_f64(),
            x = alert.bounding_box.x,
            y = alert.bounding_box.y,
            "Person inactive beyond threshold"
        );
    }
}

/// Keeps every alert it receives.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    alerts: Vec<InactivityAlert>,
}

impl RecordingSink {
    pub fn alerts(&self) -> &[InactivityAlert] {
        &self.alerts
    }

    pub fn take(&mut self) -> Vec<InactivityAlert> {
        std::mem::take(&mut self.alerts)
    }
}

impl AlertSink for RecordingSink {
    fn on_inactivity_alert(&mut self, alert: &InactivityAlert) {
        self.alerts.push(alert.clone());
    }
}

/// The audio device an alarm is played on.
#[cfg_attr(test, automock)]
pub trait ToneOutput: Send {
    fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<(), AlertError>;
}

type Opener<O> = Box<dyn FnMut() -> Result<O, AlertError> + Send>;

/// Owns an output device that is opened lazily and closed explicitly.
pub struct AudioHandle<O: ToneOutput> {
    output: Option<O>,
    opener: Opener<O>,
}

impl<O: ToneOutput> AudioHandle<O> {
    pub fn new(opener: impl FnMut() -> Result<O, AlertError> + Send + 'static) -> Self {
        Self {
            output: None,
            opener: Box::new(opener),
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.output.is_some()
    }

    /// Opens the device if it is not open yet.
    pub fn acquire(&mut self) -> Result<&mut O, AlertError> {
        if self.output.is_none() {
            let output = (self.opener)()?;
            debug!("Audio output acquired");
            self.output = Some(output);
        }
        self.output
            .as_mut()
            .ok_or_else(|| AlertError::DeviceUnavailable("device was not retained".to_string()))
    }

    pub fn release(&mut self) {
        if self.output.take().is_some() {
            debug!("Audio output released");
        }
    }
}

/// Plays the alarm pattern on every alert unless muted.
pub struct AlarmSink<O: ToneOutput> {
    handle: AudioHandle<O>,
    muted: bool,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl<O: ToneOutput> AlarmSink<O> {
    pub fn new(handle: AudioHandle<O>, sample_rate: u32) -> Self {
        Self {
            handle,
            muted: false,
            sample_rate,
            samples: synthesize_alarm(sample_rate),
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn handle(&self) -> &AudioHandle<O> {
        &self.handle
    }

    fn play_alarm(&mut self) -> Result<(), AlertError> {
        let output = self.handle.acquire()?;
        output.play(&self.samples, self.sample_rate)
    }
}

impl<O: ToneOutput> AlertSink for AlarmSink<O> {
    fn on_inactivity_alert(&mut self, alert: &InactivityAlert) {
        if self.muted {
            debug!(track_id = %alert.track_id, "Alarm muted");
            return;
        }
        match self.play_alarm() {
            Ok(()) => info!(track_id = %alert.track_id, "Alarm played"),
            Err(e) => warn!(track_id = %alert.track_id, error = %e, "Alarm playback failed"),
        }
    }

    fn shutdown(&mut self) {
        self.handle.release();
    }
}

impl<O: ToneOutput> Drop for AlarmSink<O> {
    fn drop(&mut self) {
        self.handle.release();
    }
}

/// Renders [`ALARM_PATTERN`] to mono PCM samples in `[-0.5, 0.5]`.
pub fn synthesize_alarm(sample_rate: u32) -> Vec<f32> {
    let rate = sample_rate.max(1) as f32;
    let total_secs = ALARM_PATTERN
        .iter()
        .map(|b| b.offset_secs + b.duration_secs)
        .fold(0.0_f32, f32::max);
    let mut samples = vec![0.0_f32; (total_secs * rate).round() as usize];

    for beep in &ALARM_PATTERN {
        let start = (beep.offset_secs * rate).round() as usize;
        let length = (beep.duration_secs * rate).round() as usize;

        for i in 0..length {
            let Some(slot) = samples.get_mut(start + i) else {
                break;
            };
            let t = i as f32 / rate;
            let phase = (2.0 * PI * beep.frequency_hz * t).sin();
            let square = if phase >= 0.0 { 1.0 } else { -1.0 };
            *slot += square * envelope(t, beep.duration_secs);
        }
    }

    samples
}

/// Linear attack to full gain, hold, then linear release to silence.
fn envelope(t: f32, duration: f32) -> f32 {
    if t < BEEP_RAMP_SECS {
        BEEP_GAIN * t / BEEP_RAMP_SECS
    } else if t > duration - BEEP_RAMP_SECS {
        (BEEP_GAIN * (duration - t) / BEEP_RAMP_SECS).max(0.0)
    } else {
        BEEP_GAIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert() -> InactivityAlert {
        InactivityAlert {
            track_id: TrackId(4),
            inactive_time: Duration::from_secs(10),
            bounding_box: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        }
    }

    fn counting_opener(
        opens: Arc<AtomicUsize>,
        plays: usize,
    ) -> impl FnMut() -> Result<MockToneOutput, AlertError> + Send + 'static {
        move || {
            opens.fetch_add(1, Ordering::SeqCst);
            let mut output = MockToneOutput::new();
            output.expect_play().times(plays).returning(|_, _| Ok(()));
            Ok(output)
        }
    }

    #[test]
    fn alarm_has_expected_length_and_gaps() {
        let rate = 8_000;
        let samples = synthesize_alarm(rate);
        assert_eq!(samples.len(), 8_400);

        // Between the first and second beep there is silence.
        assert!(samples[(0.17 * rate as f32) as usize..(0.19 * rate as f32) as usize]
            .iter()
            .all(|s| *s == 0.0));
        // Mid-beep the square wave sits at full gain.
        assert!((samples[(0.07 * rate as f32) as usize].abs() - BEEP_GAIN).abs() < 1e-6);
        assert!(samples.iter().all(|s| s.abs() <= BEEP_GAIN + 1e-6));
        assert_eq!(samples[0], 0.0);
    }

    #[test]
    fn envelope_ramps_in_and_out() {
        assert_eq!(envelope(0.0, 0.15), 0.0);
        assert!((envelope(0.01, 0.15) - 0.25).abs() < 1e-6);
        assert_eq!(envelope(0.1, 0.15), BEEP_GAIN);
        assert!(envelope(0.149, 0.15) < 0.05);
        assert_eq!(envelope(0.2, 0.15), 0.0);
    }

    #[test]
    fn device_is_acquired_on_first_alarm_and_released_on_shutdown() {
        let opens = Arc::new(AtomicUsize::new(0));
        let handle = AudioHandle::new(counting_opener(opens.clone(), 2));
        let mut sink = AlarmSink::new(handle, 8_000);
        assert!(!sink.handle().is_acquired());

        sink.on_inactivity_alert(&alert());
        sink.on_inactivity_alert(&alert());
        assert!(sink.handle().is_acquired());
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        sink.shutdown();
        assert!(!sink.handle().is_acquired());
    }

    #[test]
    fn muted_alarm_never_opens_the_device() {
        let opens = Arc::new(AtomicUsize::new(0));
        let handle = AudioHandle::new(counting_opener(opens.clone(), 0));
        let mut sink = AlarmSink::new(handle, 8_000);
        sink.set_muted(true);

        sink.on_inactivity_alert(&alert());

        assert!(sink.is_muted());
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert!(!sink.handle().is_acquired());
    }

    #[test]
    fn failing_device_is_logged_not_fatal() {
        let handle: AudioHandle<MockToneOutput> =
            AudioHandle::new(|| Err(AlertError::DeviceUnavailable("no speakers".to_string())));
        let mut sink = AlarmSink::new(handle, 8_000);

        sink.on_inactivity_alert(&alert());
        assert!(!sink.handle().is_acquired());
    }

    #[test]
    fn recording_sink_keeps_alerts_in_order() {
        let mut sink = RecordingSink::default();
        sink.on_inactivity_alert(&alert());
        let mut second = alert();
        second.track_id = TrackId(9);
        sink.on_inactivity_alert(&second);

        let ids: Vec<TrackId> = sink.take().into_iter().map(|a| a.track_id).collect();
        assert_eq!(ids, vec![TrackId(4), TrackId(9)]);
        assert!(sink.alerts().is_empty());
    }
}
