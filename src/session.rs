//! Live tracking session.
//!
//! One tokio task owns the [`FusionPipeline`]. It selects over a stop signal,
//! a fixed-rate tick and the sensor input channel, and pushes every output
//! onto a bounded channel in processing order. Producers never block: a full
//! input or output channel drops the item with a warning.

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use crate::config::{SessionConfig, TrackerConfig};
use crate::error::{AcquisitionErrorKind, ConfigError, TrackerError, TrackerResult};
use crate::sensor_fusion::{FusionPipeline, TrackerOutput};
use crate::state_machine::TrackingState;
use crate::status::{current_timestamp, TrackerStatus};
use crate::types::{RawFix, RawMotion, RawOrientation};

#[derive(Clone, Debug, PartialEq)]
pub enum SensorInput {
    Fix(RawFix),
    Orientation(RawOrientation),
    Motion(RawMotion),
    AcquisitionError {
        kind: AcquisitionErrorKind,
        message: String,
    },
}

/// Unix-seconds clock driven by tokio's monotonic instant, so a paused test
/// runtime controls it too.
#[derive(Clone, Copy, Debug)]
pub struct SessionClock {
    base_unix: f64,
    origin: Instant,
}

impl SessionClock {
    pub fn start_now() -> Self {
        Self::anchored(current_timestamp())
    }

    pub fn anchored(base_unix: f64) -> Self {
        Self {
            base_unix,
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.base_unix + self.origin.elapsed().as_secs_f64()
    }
}

/// Cloneable handle the acquisition side uses to push raw samples.
#[derive(Clone)]
pub struct SensorSender {
    tx: mpsc::Sender<SensorInput>,
}

impl SensorSender {
    pub fn on_raw_fix(&self, fix: RawFix) -> TrackerResult<()> {
        self.send(SensorInput::Fix(fix))
    }

    pub fn on_raw_orientation(&self, sample: RawOrientation) -> TrackerResult<()> {
        self.send(SensorInput::Orientation(sample))
    }

    pub fn on_raw_motion(&self, sample: RawMotion) -> TrackerResult<()> {
        self.send(SensorInput::Motion(sample))
    }

    pub fn on_acquisition_error(&self, kind: AcquisitionErrorKind, message: impl Into<String>) -> TrackerResult<()> {
        self.send(SensorInput::AcquisitionError {
            kind,
            message: message.into(),
        })
    }

    pub fn send(&self, input: SensorInput) -> TrackerResult<()> {
        match self.tx.try_send(input) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                log::warn!("sensor input channel full, dropping sample");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(TrackerError::NotRunning),
        }
    }
}

pub struct TrackingSession {
    sender: SensorSender,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<TrackingState>,
    handle: Option<JoinHandle<TrackerStatus>>,
    clock: SessionClock,
}

impl TrackingSession {
    /// Validate `config` and spawn the session on the current runtime.
    pub fn start(config: TrackerConfig) -> Result<(Self, mpsc::Receiver<TrackerOutput>), ConfigError> {
        Self::start_with_clock(config, SessionClock::start_now())
    }

    pub fn start_with_clock(
        config: TrackerConfig,
        clock: SessionClock,
    ) -> Result<(Self, mpsc::Receiver<TrackerOutput>), ConfigError> {
        let session_config = config.session.clone();
        let pipeline = FusionPipeline::new(config)?;
        Ok(Self::spawn(pipeline, &session_config, clock))
    }

    /// Run an already-built pipeline.
    pub fn spawn(
        pipeline: FusionPipeline,
        config: &SessionConfig,
        clock: SessionClock,
    ) -> (Self, mpsc::Receiver<TrackerOutput>) {
        let (input_tx, input_rx) = mpsc::channel(config.input_capacity.max(1));
        let (output_tx, output_rx) = mpsc::channel(config.output_capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(pipeline.state());

        let tick = Duration::from_millis(config.tick_interval_ms.max(1));
        let handle = tokio::spawn(run(pipeline, input_rx, output_tx, stop_rx, state_tx, clock, tick));
        log::info!("tracking session started (tick {} ms)", tick.as_millis());

        let session = Self {
            sender: SensorSender { tx: input_tx },
            stop_tx,
            state_rx,
            handle: Some(handle),
            clock,
        };
        (session, output_rx)
    }

    pub fn sender(&self) -> SensorSender {
        self.sender.clone()
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    pub fn state(&self) -> TrackingState {
        *self.state_rx.borrow()
    }

    /// A receiver that follows every state change.
    pub fn watch_state(&self) -> watch::Receiver<TrackingState> {
        self.state_rx.clone()
    }

    /// Stop the task and wait for it. Only the first call returns the final status.
    pub async fn stop(&mut self) -> Option<TrackerStatus> {
        let _ = self.stop_tx.send(true);
        let handle = self.handle.take()?;
        match handle.await {
            Ok(status) => {
                log::info!(
                    "tracking session stopped after {} position updates",
                    status.position_updates
                );
                Some(status)
            }
            Err(err) => {
                log::warn!("tracking session task failed: {err}");
                None
            }
        }
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

fn emit(outputs: &mpsc::Sender<TrackerOutput>, output: TrackerOutput) {
    match outputs.try_send(output) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            log::warn!("output channel full, dropping {}", output_kind(&dropped));
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("output receiver gone");
        }
    }
}

fn output_kind(output: &TrackerOutput) -> &'static str {
    match output {
        TrackerOutput::Position(_) => "position update",
        TrackerOutput::Heading(_) => "heading update",
        TrackerOutput::Error(_) => "error notification",
    }
}

fn handle_input(pipeline: &mut FusionPipeline, input: SensorInput) -> Vec<TrackerOutput> {
    match input {
        SensorInput::Fix(fix) => pipeline.feed_fix(&fix),
        SensorInput::Orientation(sample) => {
            pipeline.feed_orientation(&sample);
            Vec::new()
        }
        SensorInput::Motion(sample) => {
            pipeline.feed_motion(&sample);
            Vec::new()
        }
        SensorInput::AcquisitionError { kind, message } => pipeline.feed_acquisition_error(kind, &message),
    }
}

async fn run(
    mut pipeline: FusionPipeline,
    mut inputs: mpsc::Receiver<SensorInput>,
    outputs: mpsc::Sender<TrackerOutput>,
    mut stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<TrackingState>,
    clock: SessionClock,
    tick: Duration,
) -> TrackerStatus {
    pipeline.start();
    state_tx.send_replace(pipeline.state());

    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let produced = tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            // ahead of inputs so a busy producer cannot starve the cadence
            _ = ticker.tick() => pipeline.tick(clock.now()),
            input = inputs.recv() => match input {
                Some(input) => handle_input(&mut pipeline, input),
                None => break,
            },
        };

        for output in produced {
            emit(&outputs, output);
        }

        let state = pipeline.state();
        if *state_tx.borrow() != state {
            state_tx.send_replace(state);
        }
        if !pipeline.is_running() {
            log::info!("pipeline left the running states, ending session");
            break;
        }
    }

    pipeline.stop();
    state_tx.send_replace(pipeline.state());
    pipeline.status(clock.now())
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: f64 = 1_700_000_000.0;

    fn quiet_config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.satellites.constellations.clear();
        config
    }

    fn start(config: TrackerConfig) -> (TrackingSession, mpsc::Receiver<TrackerOutput>) {
        TrackingSession::start_with_clock(config, SessionClock::anchored(T0)).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<TrackerOutput>) -> Vec<TrackerOutput> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_and_dead_reckoning() {
        let (mut session, mut rx) = start(quiet_config());
        let sender = session.sender();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.state(), TrackingState::Acquiring);

        sender.on_raw_fix(RawFix::new(T0 - 1.0, 10.0, 20.0, 5.0)).unwrap();
        sender.on_raw_fix(RawFix::new(T0, 10.0001, 20.0, 5.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(session.state(), TrackingState::Tracking);

        let outputs = drain(&mut rx);
        let real = outputs
            .iter()
            .filter(|o| matches!(o, TrackerOutput::Position(p) if p.meta.is_real_fix))
            .count();
        let predicted = outputs
            .iter()
            .filter(|o| matches!(o, TrackerOutput::Position(p) if p.meta.predicted))
            .count();
        assert_eq!(real, 2);
        assert!(predicted >= 3, "only {predicted} predictions");

        let status = session.stop().await.unwrap();
        assert_eq!(status.state, TrackingState::Stopped);
        assert_eq!(status.fixes_accepted, 2);
        assert_eq!(session.state(), TrackingState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_and_recovery() {
        let (mut session, mut rx) = start(quiet_config());
        let sender = session.sender();
        sender.on_raw_fix(RawFix::new(T0 - 1.0, 10.0, 20.0, 5.0)).unwrap();
        sender.on_raw_fix(RawFix::new(T0, 10.0, 20.0, 5.0)).unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(session.state(), TrackingState::Degraded);

        let now = session.clock().now();
        sender.on_raw_fix(RawFix::new(now, 10.0, 20.0, 5.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.state(), TrackingState::Tracking);

        drain(&mut rx);
        session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_ends_session() {
        let (mut session, mut rx) = start(quiet_config());
        let sender = session.sender();
        sender
            .on_acquisition_error(AcquisitionErrorKind::Timeout, "no fix yet")
            .unwrap();
        sender
            .on_acquisition_error(AcquisitionErrorKind::HardwareUnavailable, "no gps chip")
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, TrackerOutput::Error(TrackerError::AcquisitionTimeout(_))));
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            TrackerOutput::Error(TrackerError::AcquisitionUnavailable {
                kind: AcquisitionErrorKind::HardwareUnavailable,
                ..
            })
        ));

        // the task ends on its own and closes the output channel
        assert!(rx.recv().await.is_none());
        assert_eq!(session.state(), TrackingState::Stopped);
        assert_eq!(
            sender.on_raw_fix(RawFix::new(T0, 1.0, 1.0, 5.0)),
            Err(TrackerError::NotRunning)
        );
        assert!(session.stop().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_final() {
        let (mut session, mut rx) = start(quiet_config());
        let sender = session.sender();
        sender.on_raw_fix(RawFix::new(T0, 10.0, 20.0, 5.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(session.stop().await.is_some());
        assert!(session.stop().await.is_none());

        // buffered items may remain, then the channel is closed for good
        while rx.recv().await.is_some() {}
        assert_eq!(
            sender.on_raw_fix(RawFix::new(T0 + 1.0, 10.0, 20.0, 5.0)),
            Err(TrackerError::NotRunning)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_output_channel_drops_instead_of_blocking() {
        let mut config = quiet_config();
        config.session.output_capacity = 1;
        let (mut session, mut rx) = start(config);
        let sender = session.sender();
        sender.on_raw_fix(RawFix::new(T0 - 1.0, 10.0, 20.0, 5.0)).unwrap();
        sender.on_raw_fix(RawFix::new(T0, 10.0001, 20.0, 5.0)).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.state(), TrackingState::Tracking);
        assert_eq!(drain(&mut rx).len(), 1);

        let status = session.stop().await.unwrap();
        assert!(status.position_updates > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_headings_flow_from_device_compass() {
        let (mut session, mut rx) = start(quiet_config());
        let sender = session.sender();
        sender
            .on_raw_orientation(RawOrientation {
                timestamp: T0,
                alpha: None,
                compass_heading: Some(45.0),
                compass_accuracy: None,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        let headings: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|o| match o {
                TrackerOutput::Heading(h) => Some(h),
                _ => None,
            })
            .collect();
        assert!(!headings.is_empty());
        for h in &headings {
            assert!((h.heading - 45.0).abs() < 1e-9);
        }
        session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_keep_pace_under_input_flood() {
        let (mut session, mut rx) = start(quiet_config());
        let sender = session.sender();
        sender.on_raw_fix(RawFix::new(T0 - 1.0, 10.0, 20.0, 5.0)).unwrap();
        sender.on_raw_fix(RawFix::new(T0, 10.0001, 20.0, 5.0)).unwrap();

        let flood_sender = session.sender();
        let clock = session.clock();
        let flood = tokio::spawn(async move {
            loop {
                for _ in 0..200 {
                    let sample = RawMotion {
                        timestamp: clock.now(),
                        acceleration: Some([0.0, 0.0, -9.81]),
                        rotation_rate: Some([0.0, 0.0, 0.0]),
                    };
                    if flood_sender.on_raw_motion(sample).is_err() {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(1_050)).await;
        let outputs = drain(&mut rx);
        let predicted: Vec<f64> = outputs
            .iter()
            .filter_map(|o| match o {
                TrackerOutput::Position(p) if p.meta.predicted => Some(p.meta.timestamp),
                _ => None,
            })
            .collect();
        let headings = outputs
            .iter()
            .filter(|o| matches!(o, TrackerOutput::Heading(_)))
            .count();
        assert!(predicted.len() >= 9, "only {} predictions", predicted.len());
        assert!(headings >= 9, "only {headings} headings");
        assert!(predicted.windows(2).all(|w| w[1] - w[0] < 0.15));

        // a real fix sent mid-flood is emitted before the predictions built on it
        let now = session.clock().now();
        sender.on_raw_fix(RawFix::new(now, 10.0002, 20.0, 5.0)).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let outputs = drain(&mut rx);
        let fix_at = outputs
            .iter()
            .position(|o| matches!(o, TrackerOutput::Position(p) if p.meta.is_real_fix))
            .unwrap();
        assert!(outputs[fix_at + 1..].iter().any(
            |o| matches!(o, TrackerOutput::Position(p) if p.meta.predicted && p.meta.timestamp > now)
        ));

        session.stop().await;
        flood.abort();
    }
}
