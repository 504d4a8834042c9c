//! # Playback Controller
//!
//! Top-level orchestrator of a playback session.
//!
//! ## Locking
//!
//! - **Session lock** (`tokio::sync::Mutex<SessionCore>`): every lifecycle
//!   operation and every engine notification runs under it, so transitions
//!   apply in a single observed order.
//! - **Snapshot** (`parking_lot::RwLock`): refreshed after each mutation so
//!   `state()`/`position()` never wait behind a blocked `stop()`.
//!
//! ## Notification pump
//!
//! Engines report through a [`NotificationSink`] that only enqueues. A tokio
//! task drains that queue and applies each notification under the session
//! lock. The pump holds a weak reference to the controller, so dropping the
//! last controller handle ends it. Notifications are tagged with the engine
//! generation; anything from a torn-down engine is discarded. Consecutive
//! buffering updates are coalesced, latest wins.
//!
//! Engine state reports are also mirrored into a watch channel directly by
//! the sink. `stop()` waits on that channel while holding the session lock.

use crate::buffering::{BufferingDecision, PipelineContext};
use crate::dispatcher::Dispatcher;
use crate::error::{PlaybackError, Result};
use crate::events::{PlayerEvent, PlayerObserver};
use crate::seek::{
    PlanContext, SeekCompletion, SeekPlan, SeekRequest, SeekStep, SeekTicket, SeekTrigger,
};
use crate::session::{SessionCore, SessionSnapshot};
use crate::state::{PlaybackOp, PlaybackState};
use bridge_traits::{
    BridgeError, EngineNotification, EngineState, MediaSource, NotificationSink, PipelineEngine,
    SeekMode,
};
use core_runtime::config::PlayerConfig;
use core_runtime::events::EventStream;
use core_runtime::logging::source_label;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, trace, warn};
use uuid::Uuid;

type TaggedNotification = (u64, EngineNotification);

/// Engine state as last reported by the current engine, updated straight
/// from the sink so `stop()` can observe it while holding the session lock.
struct EngineStateMirror {
    generation: AtomicU64,
    tx: watch::Sender<Option<EngineState>>,
}

/// Sink handed to an engine; tags every notification with its generation.
struct EngineSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedNotification>,
    mirror: Arc<EngineStateMirror>,
}

impl NotificationSink for EngineSink {
    fn notify(&self, notification: EngineNotification) {
        if let EngineNotification::StateChanged(state) = &notification {
            if self.mirror.generation.load(Ordering::Acquire) == self.generation {
                self.mirror.tx.send_replace(Some(*state));
            }
        }
        if self.tx.send((self.generation, notification)).is_err() {
            trace!(generation = self.generation, "controller gone; notification dropped");
        }
    }
}

struct ControllerInner {
    id: Uuid,
    config: PlayerConfig,
    session: Mutex<SessionCore>,
    snapshot: RwLock<SessionSnapshot>,
    state_tx: watch::Sender<PlaybackState>,
    engine_state: Arc<EngineStateMirror>,
    notify_tx: mpsc::UnboundedSender<TaggedNotification>,
    released: AtomicBool,
    dispatcher: Dispatcher,
}

/// Playback session handle.
///
/// Cloning yields another handle to the same session.
///
/// # Example
///
/// ```ignore
/// let controller = PlaybackController::new(config)?;
/// controller.set_source(MediaSource::remote("https://cdn.example.com/a.m3u8")).await?;
/// controller.prepare_and_wait().await?;
/// controller.play().await?;
/// controller.seek(Duration::from_secs(30), SeekMode::ClosestSync).await?;
/// controller.release().await?;
/// ```
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<ControllerInner>,
}

impl PlaybackController {
    /// Create a session in `Idle`.
    ///
    /// Must be called inside a tokio runtime; the notification pump is
    /// spawned on it.
    pub fn new(config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            PlaybackError::Config(
                "PlaybackController must be created inside a tokio runtime".to_string(),
            )
        })?;

        let bus = config
            .enable_event_bus
            .then(|| core_runtime::events::EventBus::new(config.tuning.event_bus_capacity));
        let dispatcher = Dispatcher::spawn(config.tuning.pending_event_limit, bus)?;

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        let (engine_state_tx, _) = watch::channel(None);
        let session = SessionCore::new(&config.tuning, config.looping);
        let snapshot = SessionSnapshot::initial(config.looping);

        let inner = Arc::new(ControllerInner {
            id: Uuid::new_v4(),
            session: Mutex::new(session),
            snapshot: RwLock::new(snapshot),
            state_tx,
            engine_state: Arc::new(EngineStateMirror {
                generation: AtomicU64::new(0),
                tx: engine_state_tx,
            }),
            notify_tx,
            released: AtomicBool::new(false),
            dispatcher,
            config,
        });

        runtime.spawn(run_pump(Arc::downgrade(&inner), notify_rx));
        info!(
            session = %inner.id,
            engine = inner.config.engine_factory.name(),
            "playback controller created"
        );

        Ok(Self { inner })
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.id
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Bind a source and build its engine. Only from `Idle`.
    #[instrument(skip(self, source), fields(session = %self.inner.id, source = %source_label(&source)))]
    pub async fn set_source(&self, source: MediaSource) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.check(PlaybackOp::SetSource, &s)?;

        let generation = inner.engine_state.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let sink: Arc<dyn NotificationSink> = Arc::new(EngineSink {
            generation,
            tx: inner.notify_tx.clone(),
            mirror: inner.engine_state.clone(),
        });
        let engine = inner
            .config
            .engine_factory
            .create(&source, inner.config.tuning.engine_options(), sink)
            .map_err(|e| {
                warn!(error = %e, "engine factory rejected source");
                PlaybackError::from(e)
            })?;
        debug!(generation, "engine created");

        s.generation = generation;
        s.engine = Some(engine);
        s.source = Some(source);
        inner.engine_state.tx.send_replace(None);
        inner.transition(&mut s, PlaybackState::Initialized);
        Ok(())
    }

    /// Start format detection. Returns once the engine accepted the request;
    /// the session reaches `Prepared` asynchronously.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn prepare(&self) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.check(PlaybackOp::Prepare, &s)?;
        let engine = s.engine()?;

        s.last_error = None;
        inner.transition(&mut s, PlaybackState::Preparing);
        engine
            .prepare()
            .await
            .map_err(|e| inner.engine_error(&mut s, "prepare", e))?;
        Ok(())
    }

    /// Prepare and wait for the outcome, bounded by the configured
    /// `prepare_timeout`.
    pub async fn prepare_and_wait(&self) -> Result<()> {
        let mut state_rx = self.inner.state_tx.subscribe();
        self.prepare().await?;

        let timeout = self.inner.config.tuning.prepare_timeout;
        let outcome = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|state| *state != PlaybackState::Preparing),
        )
        .await
        .map(|r| r.map(|state| *state));

        match outcome {
            Ok(Ok(state)) if state.is_prepared() => Ok(()),
            Ok(Ok(PlaybackState::Error)) => {
                let last_error = self.inner.snapshot.read().last_error.clone();
                Err(last_error
                    .unwrap_or_else(|| PlaybackError::EngineFailure("prepare failed".to_string())))
            }
            Ok(Ok(state)) => Err(PlaybackError::InvalidState {
                operation: "prepare",
                state,
            }),
            Ok(Err(_)) => Err(PlaybackError::Released),
            Err(_) => {
                let err = PlaybackError::Timeout {
                    operation: "prepare",
                    timeout,
                };
                let mut s = self.inner.session.lock().await;
                if s.state == PlaybackState::Preparing {
                    self.inner.fail(&mut s, err.clone(), None);
                }
                Err(err)
            }
        }
    }

    /// Start or resume playback.
    ///
    /// From `Stopped` the session seeks to the last known position first,
    /// from `PlaybackCompleted` to the start. While buffering only the intent
    /// changes; the pipeline resumes when the cache refills.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn play(&self) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.check(PlaybackOp::Play, &s)?;
        let engine = s.engine()?;

        match s.state {
            PlaybackState::Playing => {
                debug!("already playing");
                return Ok(());
            }
            PlaybackState::Prepared | PlaybackState::Paused => {
                s.buffering.set_user_paused(false);
                if s.buffering.is_buffering() {
                    debug!("resume deferred until buffering ends");
                } else if !s.pipeline_running {
                    engine
                        .start()
                        .await
                        .map_err(|e| inner.engine_error(&mut s, "play", e))?;
                    s.pipeline_running = true;
                }
                inner.transition(&mut s, PlaybackState::Playing);
            }
            PlaybackState::Stopped | PlaybackState::PlaybackCompleted => {
                s.buffering.set_user_paused(false);
                let position = if s.state == PlaybackState::Stopped {
                    s.position
                } else {
                    Duration::ZERO
                };
                let request =
                    SeekRequest::new(position, SeekMode::PreviousSync, SeekTrigger::Restart);
                inner.run_seek(&mut s, request, SeekPlan::restart()).await?;
            }
            state => {
                return Err(PlaybackError::InvalidState {
                    operation: "play",
                    state,
                })
            }
        }

        inner.publish(&s);
        Ok(())
    }

    /// Pause playback. Succeeds without effect from `PlaybackCompleted`.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn pause(&self) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.check(PlaybackOp::Pause, &s)?;

        match s.state {
            PlaybackState::PlaybackCompleted => return Ok(()),
            PlaybackState::Paused => s.buffering.set_user_paused(true),
            PlaybackState::Playing | PlaybackState::Prepared => {
                if s.pipeline_running {
                    let engine = s.engine()?;
                    engine
                        .pause()
                        .await
                        .map_err(|e| inner.engine_error(&mut s, "pause", e))?;
                    s.pipeline_running = false;
                }
                s.buffering.set_user_paused(true);
                inner.transition(&mut s, PlaybackState::Paused);
            }
            state => {
                return Err(PlaybackError::InvalidState {
                    operation: "pause",
                    state,
                })
            }
        }

        inner.publish(&s);
        Ok(())
    }

    /// Reposition playback. Completion is reported as
    /// [`PlayerEvent::SeekDone`] unless a newer seek supersedes it.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn seek(&self, position: Duration, mode: SeekMode) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.check(PlaybackOp::Seek, &s)?;

        if let Some(media) = &s.media {
            if !media.seekable {
                return Err(PlaybackError::InvalidParameter(
                    "source is not seekable".to_string(),
                ));
            }
            if let Some(duration) = media.duration {
                if position > duration {
                    return Err(PlaybackError::InvalidParameter(format!(
                        "seek position {:?} beyond duration {:?}",
                        position, duration
                    )));
                }
            }
        }

        let plan = SeekPlan::for_state(s.state, inner.plan_context(&s)).ok_or(
            PlaybackError::InvalidState {
                operation: "seek",
                state: s.state,
            },
        )?;
        inner
            .run_seek(&mut s, SeekRequest::user(position, mode), plan)
            .await
    }

    /// Stop the pipeline and wait, bounded, for the engine to confirm.
    ///
    /// Succeeds without effect from `Stopped`. On timeout the session moves
    /// to `Error`.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        if s.state == PlaybackState::Stopped && !inner.released.load(Ordering::Acquire) {
            return Ok(());
        }
        inner.check(PlaybackOp::Stop, &s)?;
        let engine = s.engine()?;

        let previous = s.state;
        let was_running = s.pipeline_running;
        inner.transition(&mut s, PlaybackState::Stopping);
        let mut engine_rx = match inner.halt_pipeline(&mut s, &engine).await {
            Ok(rx) => rx,
            Err(err) => {
                if s.state == PlaybackState::Stopping {
                    inner
                        .restore_after_rejected_stop(&mut s, &engine, previous, was_running)
                        .await;
                }
                return Err(err);
            }
        };

        let timeout = inner.config.tuning.stop_timeout;
        let confirmed = tokio::time::timeout(
            timeout,
            engine_rx.wait_for(|state| *state == Some(EngineState::Stopped)),
        )
        .await
        .map(|r| r.is_ok());

        if confirmed != Ok(true) {
            let err = PlaybackError::Timeout {
                operation: "stop",
                timeout,
            };
            inner.fail(&mut s, err.clone(), None);
            return Err(err);
        }

        if s.seeks.cancel_accurate() {
            debug!("accurate seek abandoned by stop");
        }
        s.buffering.reset();
        s.seeks.reset();
        inner.transition(&mut s, PlaybackState::Stopped);
        inner.publish(&s);
        Ok(())
    }

    /// Tear down the engine and return to `Idle`. Idempotent; the only
    /// operation besides `release()` accepted in `Error`.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn reset(&self) -> Result<()> {
        if self.inner.released.load(Ordering::Acquire) {
            return Err(PlaybackError::Released);
        }
        self.inner.reset_session().await;
        Ok(())
    }

    /// Reset, deliver every queued event and stop the dispatcher. Idempotent;
    /// every other operation fails with [`PlaybackError::Released`] afterwards.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn release(&self) -> Result<()> {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.reset_session().await;
        self.inner.dispatcher.drain().await;
        self.inner.dispatcher.shutdown();
        info!("playback controller released");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rate, tracks, looping
    // ------------------------------------------------------------------

    /// Change the playback rate: flush, re-seek to the current position and
    /// resume if the pipeline was running.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn set_rate(&self, rate: f32) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.check(PlaybackOp::SetRate, &s)?;

        let tuning = &inner.config.tuning;
        if !rate.is_finite() || rate < tuning.min_rate || rate > tuning.max_rate {
            return Err(PlaybackError::InvalidParameter(format!(
                "rate {} outside [{}, {}]",
                rate, tuning.min_rate, tuning.max_rate
            )));
        }
        if rate == s.rate {
            return Ok(());
        }

        let engine = s.engine()?;
        engine
            .set_rate(rate)
            .await
            .map_err(|e| inner.engine_error(&mut s, "set_rate", e))?;
        s.rate = rate;

        let plan = SeekPlan::for_state(s.state, inner.plan_context(&s)).ok_or(
            PlaybackError::InvalidState {
                operation: "set_rate",
                state: s.state,
            },
        )?;
        let request = SeekRequest::new(s.position, SeekMode::ClosestSync, SeekTrigger::RateChange);
        inner.run_seek(&mut s, request, plan).await?;

        inner.dispatcher.post(PlayerEvent::RateChanged { rate });
        inner.publish(&s);
        Ok(())
    }

    /// Switch to another track: flush, re-seek to the current position and
    /// resume if the pipeline was running. [`PlayerEvent::TrackChanged`] is
    /// emitted when the engine confirms.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn select_track(&self, index: usize) -> Result<()> {
        let inner = &self.inner;
        let mut s = inner.session.lock().await;
        inner.check(PlaybackOp::SelectTrack, &s)?;

        let known = s
            .media
            .as_ref()
            .is_some_and(|m| m.tracks.iter().any(|t| t.index == index));
        if !known {
            return Err(PlaybackError::InvalidParameter(format!(
                "no track with index {}",
                index
            )));
        }

        let engine = s.engine()?;
        engine
            .select_track(index)
            .await
            .map_err(|e| inner.engine_error(&mut s, "select_track", e))?;

        let plan = SeekPlan::for_state(s.state, inner.plan_context(&s)).ok_or(
            PlaybackError::InvalidState {
                operation: "select_track",
                state: s.state,
            },
        )?;
        let request =
            SeekRequest::new(s.position, SeekMode::ClosestSync, SeekTrigger::TrackSwitch);
        inner.run_seek(&mut s, request, plan).await
    }

    pub async fn set_looping(&self, looping: bool) -> Result<()> {
        if self.inner.released.load(Ordering::Acquire) {
            return Err(PlaybackError::Released);
        }
        let mut s = self.inner.session.lock().await;
        s.looping = looping;
        self.inner.publish(&s);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.inner.snapshot.read().state
    }

    pub fn position(&self) -> Duration {
        self.inner.snapshot.read().position
    }

    pub fn position_ms(&self) -> u64 {
        self.position().as_millis() as u64
    }

    /// `None` until the engine reports a finite duration.
    pub fn duration(&self) -> Option<Duration> {
        self.inner.snapshot.read().duration
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration().map(|d| d.as_millis() as u64)
    }

    pub fn is_looping(&self) -> bool {
        self.inner.snapshot.read().looping
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.read().clone()
    }

    /// Watch channel following every state transition.
    pub fn state_changes(&self) -> watch::Receiver<PlaybackState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the session reaches `target`.
    pub async fn wait_for_state(&self, target: PlaybackState, timeout: Duration) -> Result<()> {
        let mut rx = self.inner.state_tx.subscribe();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|state| *state == target))
            .await
            .map(|r| r.is_ok());
        match reached {
            Ok(true) => Ok(()),
            Ok(false) => Err(PlaybackError::Released),
            Err(_) => Err(PlaybackError::Timeout {
                operation: "wait_for_state",
                timeout,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Attach (or detach with `None`) the single observer. Events produced
    /// while none was attached are replayed to it first.
    pub fn set_observer(&self, observer: Option<Arc<dyn PlayerObserver>>) {
        self.inner.dispatcher.set_observer(observer);
    }

    /// Broadcast mirror of the event stream; `None` unless enabled in the
    /// configuration.
    pub fn subscribe(&self) -> Option<EventStream<PlayerEvent>> {
        self.inner.dispatcher.subscribe().map(EventStream::new)
    }

    /// Wait until every event produced so far has reached the observer.
    pub async fn drain(&self) {
        self.inner.dispatcher.drain().await;
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("session", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

impl ControllerInner {
    fn check(&self, op: PlaybackOp, s: &SessionCore) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(PlaybackError::Released);
        }
        if s.state.allows(op) {
            Ok(())
        } else {
            debug!(operation = op.name(), state = ?s.state, "operation rejected");
            Err(PlaybackError::InvalidState {
                operation: op.name(),
                state: s.state,
            })
        }
    }

    fn plan_context(&self, s: &SessionCore) -> PlanContext {
        PlanContext {
            pipeline_running: s.pipeline_running,
            preroll_on_paused_seek: self.config.tuning.preroll_on_paused_seek,
            completed_while_streaming: s.completed_while_streaming,
        }
    }

    fn publish(&self, s: &SessionCore) {
        *self.snapshot.write() = s.snapshot();
    }

    fn transition(&self, s: &mut SessionCore, new: PlaybackState) {
        if s.state == new {
            return;
        }
        let old = s.state;
        s.state = new;
        if old == PlaybackState::PlaybackCompleted {
            s.completed_while_streaming = false;
        }
        info!(session = %self.id, ?old, ?new, "state changed");
        self.publish(s);
        self.state_tx.send_replace(new);
        self.dispatcher.post(PlayerEvent::StateChanged { old, new });
    }

    fn fail(&self, s: &mut SessionCore, err: PlaybackError, code: Option<i32>) {
        error!(session = %self.id, error = %err, ?code, "session failed");
        s.seeks.reset();
        s.last_error = Some(err.clone());
        self.transition(s, PlaybackState::Error);
        self.dispatcher.post(PlayerEvent::Error {
            message: err.to_string(),
            code,
        });
        self.publish(s);
    }

    /// Map an engine command failure. Engine faults move the session to
    /// `Error`; parameter rejections leave it untouched.
    fn engine_error(
        &self,
        s: &mut SessionCore,
        operation: &'static str,
        err: BridgeError,
    ) -> PlaybackError {
        let err = PlaybackError::from(err);
        if err.is_engine_failure() {
            self.fail(s, err.clone(), None);
        } else {
            warn!(session = %self.id, operation, error = %err, "engine rejected command");
        }
        err
    }

    /// Pause, flush and stop the engine. Returns a receiver that observes the
    /// engine's stop confirmation.
    async fn halt_pipeline(
        &self,
        s: &mut SessionCore,
        engine: &Arc<dyn PipelineEngine>,
    ) -> Result<watch::Receiver<Option<EngineState>>> {
        if s.pipeline_running {
            engine
                .pause()
                .await
                .map_err(|e| self.engine_error(s, "stop", e))?;
            s.pipeline_running = false;
        }
        engine
            .flush()
            .await
            .map_err(|e| self.engine_error(s, "stop", e))?;

        self.engine_state.tx.send_replace(None);
        let engine_rx = self.engine_state.tx.subscribe();
        engine
            .stop()
            .await
            .map_err(|e| self.engine_error(s, "stop", e))?;
        Ok(engine_rx)
    }

    /// The engine refused part of a stop without failing; return to the
    /// state the session was in.
    async fn restore_after_rejected_stop(
        &self,
        s: &mut SessionCore,
        engine: &Arc<dyn PipelineEngine>,
        previous: PlaybackState,
        was_running: bool,
    ) {
        if was_running && !s.pipeline_running && !s.buffering.is_buffering() {
            match engine.start().await {
                Ok(()) => s.pipeline_running = true,
                Err(e) => {
                    warn!(session = %self.id, error = %e, "failed to resume after rejected stop")
                }
            }
        }
        self.transition(s, previous);
        self.publish(s);
    }

    /// Issue a seek and run its plan against the engine.
    ///
    /// If the engine rejects any step the ticket is withdrawn, the decode
    /// speed-up it raised is restored and a pipeline it paused is restarted.
    async fn run_seek(
        &self,
        s: &mut SessionCore,
        request: SeekRequest,
        plan: SeekPlan,
    ) -> Result<()> {
        let engine = s.engine()?;
        let was_running = s.pipeline_running;
        let ticket = s.seeks.issue(request);
        debug!(
            session = %self.id,
            seq = ticket.seq,
            position_ms = request.position.as_millis() as u64,
            mode = ?request.mode,
            trigger = ?request.trigger,
            steps = ?plan.steps,
            "seek issued"
        );

        if let Err(err) = self.apply_seek_plan(s, &engine, &ticket, &plan).await {
            self.abandon_seek(s, &engine, &ticket, was_running).await;
            return Err(err);
        }

        s.position = request.position;
        if let Some(next) = plan.next_state {
            self.transition(s, next);
        }
        self.publish(s);
        Ok(())
    }

    async fn apply_seek_plan(
        &self,
        s: &mut SessionCore,
        engine: &Arc<dyn PipelineEngine>,
        ticket: &SeekTicket,
        plan: &SeekPlan,
    ) -> Result<()> {
        let request = ticket.request;
        if request.mode.is_accurate() {
            if s.seeks.start_accurate(ticket) {
                engine
                    .set_decode_speedup(Some(self.config.tuning.accurate_seek_speedup))
                    .await
                    .map_err(|e| self.engine_error(s, "seek", e))?;
            }
        } else if s.seeks.cancel_accurate() {
            engine
                .set_decode_speedup(None)
                .await
                .map_err(|e| self.engine_error(s, "seek", e))?;
        }

        for step in &plan.steps {
            match step {
                SeekStep::Pause => {
                    engine
                        .pause()
                        .await
                        .map_err(|e| self.engine_error(s, "seek", e))?;
                    s.pipeline_running = false;
                }
                SeekStep::Flush => engine
                    .flush()
                    .await
                    .map_err(|e| self.engine_error(s, "seek", e))?,
                SeekStep::Seek => engine
                    .seek(request.position, request.mode)
                    .await
                    .map_err(|e| self.engine_error(s, "seek", e))?,
                SeekStep::Preroll => engine
                    .preroll()
                    .await
                    .map_err(|e| self.engine_error(s, "seek", e))?,
                SeekStep::Start => {
                    if s.buffering.is_buffering() {
                        debug!("start deferred until buffering ends");
                    } else {
                        engine
                            .start()
                            .await
                            .map_err(|e| self.engine_error(s, "seek", e))?;
                        s.pipeline_running = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Roll back a seek whose plan the engine rejected. A session that
    /// already failed has had its seeks cleared.
    async fn abandon_seek(
        &self,
        s: &mut SessionCore,
        engine: &Arc<dyn PipelineEngine>,
        ticket: &SeekTicket,
        was_running: bool,
    ) {
        if s.state == PlaybackState::Error {
            return;
        }
        warn!(session = %self.id, seq = ticket.seq, "seek abandoned");

        if s.seeks.abandon(ticket.seq) {
            if let Err(e) = engine.set_decode_speedup(None).await {
                warn!(session = %self.id, error = %e, "failed to restore decode speed");
            }
        }
        if was_running && !s.pipeline_running && !s.buffering.is_buffering() {
            match engine.start().await {
                Ok(()) => s.pipeline_running = true,
                Err(e) => {
                    warn!(session = %self.id, error = %e, "failed to resume after rejected seek")
                }
            }
        }
        self.publish(s);
    }

    async fn reset_session(&self) {
        let mut s = self.session.lock().await;
        let generation = self.engine_state.generation.fetch_add(1, Ordering::AcqRel) + 1;
        s.generation = generation;

        if let Some(engine) = s.engine.take() {
            if let Err(e) = engine.release().await {
                warn!(session = %self.id, error = %e, "engine release failed");
            }
        }
        s.clear_source();
        self.engine_state.tx.send_replace(None);
        self.transition(&mut s, PlaybackState::Idle);
        self.publish(&s);
    }

    async fn handle_notification(&self, generation: u64, notification: EngineNotification) {
        if generation != self.engine_state.generation.load(Ordering::Acquire) {
            trace!(generation, kind = notification.kind(), "stale notification discarded");
            return;
        }

        let mut s = self.session.lock().await;
        if s.generation != generation {
            trace!(generation, kind = notification.kind(), "stale notification discarded");
            return;
        }
        trace!(session = %self.id, kind = notification.kind(), "engine notification");

        match notification {
            EngineNotification::StateChanged(EngineState::Prepared) => {
                if s.state == PlaybackState::Preparing {
                    self.transition(&mut s, PlaybackState::Prepared);
                }
            }
            EngineNotification::StateChanged(_) => {}
            EngineNotification::MediaInfo(info) => {
                let playable = info.has_tracks();
                debug!(
                    duration = ?info.duration,
                    tracks = info.tracks.len(),
                    seekable = info.seekable,
                    "media info"
                );
                s.media = Some(info);
                if !playable && s.state == PlaybackState::Preparing {
                    self.fail(
                        &mut s,
                        PlaybackError::UnsupportedFormat("no playable tracks".to_string()),
                        None,
                    );
                }
            }
            EngineNotification::EndOfStream => self.on_end_of_stream(&mut s).await,
            EngineNotification::Error { code, message } => {
                if !matches!(s.state, PlaybackState::Error | PlaybackState::Idle) {
                    self.fail(&mut s, PlaybackError::EngineFailure(message), Some(code));
                }
            }
            EngineNotification::BufferingPercent(percent) => {
                self.on_buffering_percent(&mut s, percent).await
            }
            EngineNotification::SeekDone { position } => self.on_seek_done(&mut s, position),
            EngineNotification::TrackChanged(index) => {
                s.selected_track = Some(index);
                self.dispatcher.post(PlayerEvent::TrackChanged { index });
            }
            EngineNotification::PositionChanged(position) => {
                self.on_position(&mut s, position).await
            }
        }

        self.publish(&s);
    }

    async fn on_buffering_percent(&self, s: &mut SessionCore, percent: u8) {
        if !s.state.is_prepared() {
            trace!(percent, state = ?s.state, "buffering update ignored");
            return;
        }

        let ctx = PipelineContext {
            intent_playing: s.state == PlaybackState::Playing,
            pipeline_running: s.pipeline_running,
        };
        match s.buffering.on_cache_percent_changed(percent, ctx) {
            BufferingDecision::Unchanged => {}
            BufferingDecision::Progress { percent } => {
                self.dispatcher
                    .post(PlayerEvent::BufferingProgress { percent });
            }
            BufferingDecision::Start {
                percent,
                pause_pipeline,
            } => {
                info!(session = %self.id, percent, pause_pipeline, "buffering started");
                self.dispatcher.post(PlayerEvent::BufferingStart { percent });
                if pause_pipeline {
                    let Ok(engine) = s.engine() else { return };
                    if engine
                        .pause()
                        .await
                        .map_err(|e| self.engine_error(s, "buffering", e))
                        .is_err()
                    {
                        return;
                    }
                    s.pipeline_running = false;
                }
            }
            BufferingDecision::End {
                percent,
                resume_pipeline,
            } => {
                info!(session = %self.id, percent, resume_pipeline, "buffering finished");
                if resume_pipeline {
                    let Ok(engine) = s.engine() else { return };
                    if engine
                        .start()
                        .await
                        .map_err(|e| self.engine_error(s, "buffering", e))
                        .is_err()
                    {
                        return;
                    }
                    s.pipeline_running = true;
                }
                self.dispatcher.post(PlayerEvent::BufferingEnd { percent });
            }
        }
    }

    fn on_seek_done(&self, s: &mut SessionCore, landed: Duration) {
        match s.seeks.on_seek_done() {
            SeekCompletion::Latest(ticket) => {
                debug!(
                    session = %self.id,
                    seq = ticket.seq,
                    landed_ms = landed.as_millis() as u64,
                    "seek completed"
                );
                s.position = ticket.request.position;
                if ticket.request.trigger == SeekTrigger::User {
                    self.dispatcher.post(PlayerEvent::SeekDone {
                        position: ticket.request.position,
                    });
                }
            }
            SeekCompletion::Superseded(ticket) => {
                debug!(session = %self.id, seq = ticket.seq, "superseded seek completion discarded");
            }
            SeekCompletion::Unexpected => {
                warn!(session = %self.id, "seek completion without outstanding seek");
            }
        }
    }

    async fn on_position(&self, s: &mut SessionCore, position: Duration) {
        if s.seeks.on_frame_presented(position) {
            debug!(session = %self.id, "accurate seek reached target frame");
            if let Ok(engine) = s.engine() {
                if let Err(e) = engine.set_decode_speedup(None).await {
                    warn!(session = %self.id, error = %e, "failed to restore decode speed");
                }
            }
        }

        if s.seeks.is_pending() {
            trace!("position update ignored while seeking");
            return;
        }
        if !matches!(
            s.state,
            PlaybackState::Prepared | PlaybackState::Playing | PlaybackState::Paused
        ) {
            return;
        }

        s.position = position;
        self.dispatcher.post(PlayerEvent::PositionChanged {
            position,
            duration: s.duration(),
        });
    }

    async fn on_end_of_stream(&self, s: &mut SessionCore) {
        if s.state != PlaybackState::Playing {
            debug!(state = ?s.state, "end of stream ignored");
            return;
        }

        if s.looping {
            let ctx = self.plan_context(s);
            let Some(plan) = SeekPlan::for_state(PlaybackState::Playing, ctx) else {
                return;
            };
            let request = SeekRequest::new(Duration::ZERO, SeekMode::PreviousSync, SeekTrigger::Loop);
            if self.run_seek(s, request, plan).await.is_ok() {
                info!(session = %self.id, "looped to start");
                self.dispatcher.post(PlayerEvent::Looped);
            }
            return;
        }

        s.completed_while_streaming = s.is_remote() && s.pipeline_running;
        s.pipeline_running = false;
        if let Some(duration) = s.duration() {
            s.position = duration;
        }
        self.transition(s, PlaybackState::PlaybackCompleted);
        debug!(
            streaming = s.completed_while_streaming,
            "playback completed"
        );
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if self.released.load(Ordering::Acquire) {
            return;
        }
        let engine = self.session.get_mut().engine.take();
        if let (Some(engine), Ok(runtime)) = (engine, Handle::try_current()) {
            debug!(session = %self.id, "controller dropped without release; releasing engine");
            runtime.spawn(async move {
                if let Err(e) = engine.release().await {
                    warn!(error = %e, "engine release failed");
                }
            });
        }
    }
}

async fn run_pump(
    controller: Weak<ControllerInner>,
    mut rx: mpsc::UnboundedReceiver<TaggedNotification>,
) {
    let mut held: Option<TaggedNotification> = None;

    loop {
        let next = match held.take() {
            Some(message) => message,
            None => match rx.recv().await {
                Some(message) => message,
                None => break,
            },
        };

        let (generation, notification) = match next {
            (generation, EngineNotification::BufferingPercent(percent)) => {
                let mut latest = (generation, percent);
                loop {
                    match rx.try_recv() {
                        Ok((g, EngineNotification::BufferingPercent(p))) => latest = (g, p),
                        Ok(other) => {
                            held = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                (latest.0, EngineNotification::BufferingPercent(latest.1))
            }
            other => other,
        };

        let Some(inner) = controller.upgrade() else {
            break;
        };
        inner.handle_notification(generation, notification).await;
    }

    trace!("notification pump stopped");
}
