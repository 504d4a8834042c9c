//! Shared test doubles for controller integration tests.
//!
//! `RecordingEngine` records every command in call order and only emits
//! notifications when a test pushes them, which keeps the controller's
//! asynchronous pump deterministic from the test's point of view.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::{
    BridgeError, EngineFactory, EngineNotification, EngineOptions, EngineState, MediaInfo,
    MediaSource, NotificationSink, PipelineEngine, SeekMode, TrackInfo, TrackKind,
};
use core_playback::{PlaybackController, PlaybackState, PlayerEvent, PlayerObserver};
use core_runtime::config::{PlaybackTuning, PlayerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Prepare,
    Start,
    Pause,
    Stop,
    Seek(Duration, SeekMode),
    Flush,
    Preroll,
    SetRate(f32),
    SelectTrack(usize),
    Speedup(Option<f32>),
    Release,
}

pub fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

pub struct RecordingEngine {
    sink: Arc<dyn NotificationSink>,
    calls: Mutex<Vec<Call>>,
    confirm_stop: AtomicBool,
    fail_start: AtomicBool,
}

impl RecordingEngine {
    pub fn notify(&self, notification: EngineNotification) {
        self.sink.notify(notification);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn set_confirm_stop(&self, confirm: bool) {
        self.confirm_stop.store(confirm, Ordering::SeqCst);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PipelineEngine for RecordingEngine {
    async fn prepare(&self) -> bridge_traits::Result<()> {
        self.record(Call::Prepare);
        Ok(())
    }

    async fn start(&self) -> bridge_traits::Result<()> {
        self.record(Call::Start);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("codec crashed".to_string()));
        }
        Ok(())
    }

    async fn pause(&self) -> bridge_traits::Result<()> {
        self.record(Call::Pause);
        Ok(())
    }

    async fn stop(&self) -> bridge_traits::Result<()> {
        self.record(Call::Stop);
        if self.confirm_stop.load(Ordering::SeqCst) {
            self.sink
                .notify(EngineNotification::StateChanged(EngineState::Stopped));
        }
        Ok(())
    }

    async fn seek(&self, position: Duration, mode: SeekMode) -> bridge_traits::Result<()> {
        self.record(Call::Seek(position, mode));
        Ok(())
    }

    async fn flush(&self) -> bridge_traits::Result<()> {
        self.record(Call::Flush);
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> bridge_traits::Result<()> {
        self.record(Call::SetRate(rate));
        Ok(())
    }

    async fn select_track(&self, index: usize) -> bridge_traits::Result<()> {
        self.record(Call::SelectTrack(index));
        Ok(())
    }

    async fn preroll(&self) -> bridge_traits::Result<()> {
        self.record(Call::Preroll);
        Ok(())
    }

    async fn set_decode_speedup(&self, factor: Option<f32>) -> bridge_traits::Result<()> {
        self.record(Call::Speedup(factor));
        Ok(())
    }

    async fn release(&self) -> bridge_traits::Result<()> {
        self.record(Call::Release);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[derive(Default)]
pub struct RecordingFactory {
    engines: Mutex<Vec<Arc<RecordingEngine>>>,
    reject: AtomicBool,
}

impl RecordingFactory {
    pub fn engine(&self) -> Arc<RecordingEngine> {
        self.engines
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no engine created yet")
    }

    pub fn engines_created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

impl EngineFactory for RecordingFactory {
    fn create(
        &self,
        _source: &MediaSource,
        _options: EngineOptions,
        sink: Arc<dyn NotificationSink>,
    ) -> bridge_traits::Result<Arc<dyn PipelineEngine>> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(BridgeError::UnsupportedFormat("no demuxer".to_string()));
        }
        let engine = Arc::new(RecordingEngine {
            sink,
            calls: Mutex::new(Vec::new()),
            confirm_stop: AtomicBool::new(true),
            fail_start: AtomicBool::new(false),
        });
        self.engines.lock().unwrap().push(engine.clone());
        Ok(engine)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<PlayerEvent>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn count<F: Fn(&PlayerEvent) -> bool>(&self, pred: F) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }

    pub fn states(&self) -> Vec<PlaybackState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PlayerEvent::StateChanged { new, .. } => Some(new),
                _ => None,
            })
            .collect()
    }

    /// Poll until an event matching `pred` was delivered.
    pub async fn wait_for<F: Fn(&PlayerEvent) -> bool>(&self, pred: F) -> PlayerEvent {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(event) = self.events().into_iter().find(|e| pred(e)) {
                return event;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "event never delivered; got {:?}",
                self.events()
            );
            tokio::time::sleep(ms(2)).await;
        }
    }
}

impl PlayerObserver for EventLog {
    fn on_event(&self, event: PlayerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn tracks() -> Vec<TrackInfo> {
    vec![
        TrackInfo::new(0, TrackKind::Video, "video/avc"),
        TrackInfo::new(1, TrackKind::Audio, "audio/mp4a-latm").with_language("en"),
        TrackInfo::new(2, TrackKind::Audio, "audio/mp4a-latm").with_language("fr"),
    ]
}

pub fn media(duration_ms: u64) -> MediaInfo {
    MediaInfo::new(Some(ms(duration_ms)), tracks())
}

pub struct Harness {
    pub controller: PlaybackController,
    pub factory: Arc<RecordingFactory>,
    pub log: Arc<EventLog>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(PlaybackTuning::default(), false)
    }

    pub fn with(tuning: PlaybackTuning, looping: bool) -> Self {
        let factory = Arc::new(RecordingFactory::default());
        let config = PlayerConfig::builder()
            .engine_factory(factory.clone())
            .tuning(tuning)
            .looping(looping)
            .enable_event_bus(true)
            .build()
            .unwrap();
        let controller = PlaybackController::new(config).unwrap();
        let log = Arc::new(EventLog::default());
        controller.set_observer(Some(log.clone()));
        Self {
            controller,
            factory,
            log,
        }
    }

    pub fn engine(&self) -> Arc<RecordingEngine> {
        self.factory.engine()
    }

    pub async fn wait_state(&self, state: PlaybackState) {
        self.controller
            .wait_for_state(state, WAIT)
            .await
            .unwrap_or_else(|e| panic!("never reached {:?}: {}", state, e));
    }

    /// Poll until `pred` holds for the controller.
    pub async fn eventually<F: Fn(&PlaybackController) -> bool>(&self, pred: F) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !pred(&self.controller) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition never held; snapshot {:?}",
                self.controller.snapshot()
            );
            tokio::time::sleep(ms(2)).await;
        }
    }

    /// Set a source and drive the engine to `Prepared`.
    pub async fn prepared(&self, source: MediaSource, info: MediaInfo) {
        self.controller.set_source(source).await.unwrap();
        self.controller.prepare().await.unwrap();
        let engine = self.engine();
        engine.notify(EngineNotification::MediaInfo(info));
        engine.notify(EngineNotification::StateChanged(EngineState::Prepared));
        self.wait_state(PlaybackState::Prepared).await;
        engine.clear_calls();
    }

    /// Local 10 s clip, playing.
    pub async fn playing(&self) {
        self.prepared(MediaSource::file("/media/clip.mp4"), media(10_000))
            .await;
        self.controller.play().await.unwrap();
        self.engine().clear_calls();
    }

    /// Push a position report and wait until the controller applied it.
    pub async fn position(&self, position: Duration) {
        self.engine()
            .notify(EngineNotification::PositionChanged(position));
        self.eventually(|c| c.position() == position).await;
    }

    /// Push a seek completion and let the pump apply it.
    pub async fn seek_done(&self, position: Duration) {
        self.engine()
            .notify(EngineNotification::SeekDone { position });
        self.settle().await;
    }

    /// Give the notification pump a chance to run, then wait for every
    /// resulting event to reach the observer.
    pub async fn settle(&self) {
        tokio::time::sleep(ms(20)).await;
        self.controller.drain().await;
    }
}
