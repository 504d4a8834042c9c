//! End-to-end sessions against the simulated engine.
//!
//! These run on real (short) timers; every wait is bounded.

use bridge_simulated::{EngineCommand, SimulatedEngine, SimulatedEngineConfig, SimulatedEngineFactory};
use bridge_traits::{EngineState, MediaSource, SeekMode};
use core_playback::{PlaybackController, PlaybackError, PlaybackState, PlayerEvent};
use core_runtime::config::{PlaybackTuning, PlayerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(3);

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn clip(duration_ms: u64) -> SimulatedEngineConfig {
    SimulatedEngineConfig::default()
        .with_duration(Some(ms(duration_ms)))
        .with_frame_interval(ms(10))
        .with_prepare_latency(ms(5))
        .with_seek_latency(ms(5))
        .with_stop_latency(ms(5))
}

fn strict() -> PlaybackTuning {
    PlaybackTuning {
        strict_buffer_ownership: true,
        ..PlaybackTuning::default()
    }
}

struct Session {
    controller: PlaybackController,
    factory: Arc<SimulatedEngineFactory>,
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl Session {
    fn new(engine: SimulatedEngineConfig) -> Self {
        Self::with(engine, strict(), false)
    }

    fn with(engine: SimulatedEngineConfig, tuning: PlaybackTuning, looping: bool) -> Self {
        let factory = Arc::new(SimulatedEngineFactory::new(engine));
        let config = PlayerConfig::builder()
            .engine_factory(factory.clone())
            .tuning(tuning)
            .looping(looping)
            .build()
            .unwrap();
        let controller = PlaybackController::new(config).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        controller.set_observer(Some(Arc::new(move |event: PlayerEvent| {
            sink.lock().unwrap().push(event);
        })));

        Self {
            controller,
            factory,
            events,
        }
    }

    fn engine(&self) -> Arc<SimulatedEngine> {
        self.factory.last_engine().expect("no engine created")
    }

    async fn open(&self, source: MediaSource) {
        self.controller.set_source(source).await.unwrap();
        self.controller.prepare_and_wait().await.unwrap();
        assert_eq!(self.controller.state(), PlaybackState::Prepared);
    }

    async fn wait_state(&self, state: PlaybackState) {
        self.controller
            .wait_for_state(state, WAIT)
            .await
            .unwrap_or_else(|e| panic!("never reached {:?}: {}", state, e));
    }

    async fn wait_event<F: Fn(&PlayerEvent) -> bool>(&self, pred: F) -> PlayerEvent {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(event) = self.events.lock().unwrap().iter().find(|e| pred(e)) {
                return event.clone();
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "event never delivered; got {:?}",
                self.events.lock().unwrap()
            );
            tokio::time::sleep(ms(5)).await;
        }
    }

    async fn eventually<F: Fn() -> bool>(&self, pred: F) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !pred() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition never held; snapshot {:?}",
                self.controller.snapshot()
            );
            tokio::time::sleep(ms(5)).await;
        }
    }

    fn assert_pools_clean(&self) {
        let engine = self.engine();
        assert_eq!(engine.input_pool().stats().violations, 0);
        assert_eq!(engine.output_pool().stats().violations, 0);
    }
}

#[tokio::test]
async fn local_clip_plays_to_completion_and_replays() {
    let session = Session::new(clip(300));
    session.open(MediaSource::file("/media/clip.mp4")).await;
    assert_eq!(session.controller.duration_ms(), Some(300));

    session.controller.play().await.unwrap();
    session.wait_state(PlaybackState::PlaybackCompleted).await;
    assert_eq!(session.controller.position_ms(), 300);
    assert!(session.engine().frames_rendered() > 0);
    assert_eq!(session.engine().input_pool().stats().codec_configs, 1);
    assert!(session.engine().input_pool().is_strict());

    session.events.lock().unwrap().clear();
    session.controller.play().await.unwrap();
    assert_eq!(session.controller.state(), PlaybackState::Playing);
    session.wait_state(PlaybackState::PlaybackCompleted).await;

    session.assert_pools_clean();
    session.controller.release().await.unwrap();
    assert!(session.engine().is_released());
}

#[tokio::test]
async fn seek_completes_with_event() {
    let session = Session::new(clip(10_000));
    session.open(MediaSource::file("/media/clip.mp4")).await;
    session.controller.play().await.unwrap();

    session
        .controller
        .seek(ms(5_000), SeekMode::ClosestSync)
        .await
        .unwrap();
    let done = session
        .wait_event(|e| matches!(e, PlayerEvent::SeekDone { .. }))
        .await;
    assert_eq!(done, PlayerEvent::SeekDone { position: ms(5_000) });

    let controller = session.controller.clone();
    session
        .eventually(move || controller.position_ms() > 5_000)
        .await;
    session.assert_pools_clean();
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn accurate_seek_restores_decode_speed() {
    let session = Session::new(clip(10_000));
    session.open(MediaSource::file("/media/clip.mp4")).await;
    session.controller.play().await.unwrap();

    session
        .controller
        .seek(ms(2_000), SeekMode::Closest)
        .await
        .unwrap();
    assert_eq!(session.engine().decode_speedup(), Some(4.0));

    let engine = session.engine();
    session
        .eventually(move || engine.decode_speedup().is_none())
        .await;
    assert!(session
        .engine()
        .commands()
        .contains(&EngineCommand::SetDecodeSpeedup(None)));
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn stop_then_play_resumes_pipeline() {
    let session = Session::new(clip(10_000));
    session.open(MediaSource::file("/media/clip.mp4")).await;
    session.controller.play().await.unwrap();
    tokio::time::sleep(ms(50)).await;

    session.controller.stop().await.unwrap();
    assert_eq!(session.controller.state(), PlaybackState::Stopped);
    assert_eq!(session.engine().state(), EngineState::Stopped);
    assert!(!session.engine().is_rendering());

    session.controller.play().await.unwrap();
    assert_eq!(session.controller.state(), PlaybackState::Playing);
    assert!(session.engine().is_rendering());
    session.assert_pools_clean();
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn unconfirmed_stop_fails_session_until_reset() {
    let tuning = PlaybackTuning {
        stop_timeout: ms(100),
        ..strict()
    };
    let session = Session::with(clip(10_000).with_confirm_stop(false), tuning, false);
    session.open(MediaSource::file("/media/clip.mp4")).await;
    session.controller.play().await.unwrap();

    let err = session.controller.stop().await.unwrap_err();
    assert!(matches!(err, PlaybackError::Timeout { operation: "stop", .. }));
    assert_eq!(session.controller.state(), PlaybackState::Error);
    session
        .wait_event(|e| matches!(e, PlayerEvent::Error { .. }))
        .await;

    session.controller.reset().await.unwrap();
    assert_eq!(session.controller.state(), PlaybackState::Idle);
    assert!(session.engine().is_released());
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn remote_source_pauses_while_cache_is_low() {
    let session = Session::new(clip(10_000));
    let network = session.factory.network().clone();
    session
        .open(MediaSource::remote("https://cdn.example.com/vod/clip.m3u8"))
        .await;
    session.controller.play().await.unwrap();

    network.set_cache_percent(3);
    session
        .wait_event(|e| *e == PlayerEvent::BufferingStart { percent: 3 })
        .await;
    assert!(session.controller.snapshot().is_buffering);
    assert!(!session.engine().is_rendering());
    assert_eq!(session.controller.state(), PlaybackState::Playing);

    network.set_cache_percent(100);
    session
        .wait_event(|e| *e == PlayerEvent::BufferingEnd { percent: 100 })
        .await;
    assert!(session.engine().is_rendering());
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn looping_restarts_from_the_beginning() {
    let session = Session::with(clip(150), strict(), true);
    session.open(MediaSource::file("/media/loop.mp4")).await;
    session.controller.play().await.unwrap();

    session
        .wait_event(|e| matches!(e, PlayerEvent::Looped))
        .await;
    assert_eq!(session.controller.state(), PlaybackState::Playing);
    assert!(session
        .engine()
        .commands()
        .contains(&EngineCommand::Seek(Duration::ZERO, SeekMode::PreviousSync)));
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn prepare_failure_is_reported() {
    let session = Session::new(clip(10_000).with_prepare_error(-1004, "connection reset"));
    session
        .controller
        .set_source(MediaSource::remote("https://cdn.example.com/vod/clip.m3u8"))
        .await
        .unwrap();

    let err = session.controller.prepare_and_wait().await.unwrap_err();
    assert_eq!(
        err,
        PlaybackError::EngineFailure("connection reset".to_string())
    );
    let event = session
        .wait_event(|e| matches!(e, PlayerEvent::Error { .. }))
        .await;
    assert!(matches!(event, PlayerEvent::Error { code: Some(-1004), .. }));
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn live_stream_has_no_duration_and_rejects_seek() {
    let session = Session::new(
        SimulatedEngineConfig::live()
            .with_frame_interval(ms(10))
            .with_prepare_latency(ms(5)),
    );
    session
        .open(MediaSource::remote("https://cdn.example.com/live/channel.m3u8"))
        .await;
    assert_eq!(session.controller.duration(), None);

    let err = session
        .controller
        .seek(ms(1_000), SeekMode::ClosestSync)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybackError::InvalidParameter(_)));
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn rate_and_track_changes_reach_engine() {
    let session = Session::new(clip(10_000));
    session.open(MediaSource::file("/media/clip.mp4")).await;
    session.controller.play().await.unwrap();

    session.controller.set_rate(2.0).await.unwrap();
    assert_eq!(session.engine().rate(), 2.0);
    session
        .wait_event(|e| *e == PlayerEvent::RateChanged { rate: 2.0 })
        .await;

    session.controller.select_track(1).await.unwrap();
    session
        .wait_event(|e| *e == PlayerEvent::TrackChanged { index: 1 })
        .await;
    assert_eq!(session.engine().selected_track(), Some(1));
    assert_eq!(session.controller.snapshot().selected_track, Some(1));

    session.assert_pools_clean();
    session.controller.release().await.unwrap();
}

#[tokio::test]
async fn lenient_tuning_builds_lenient_pools() {
    let tuning = PlaybackTuning {
        strict_buffer_ownership: false,
        ..PlaybackTuning::default()
    };
    let session = Session::with(clip(1_000), tuning, false);
    session.open(MediaSource::file("/media/clip.mp4")).await;

    let engine = session.engine();
    assert!(!engine.input_pool().is_strict());
    assert!(!engine.output_pool().is_strict());
    session.controller.release().await.unwrap();
}
