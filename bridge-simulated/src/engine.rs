//! # Simulated Pipeline Engine
//!
//! In-process [`PipelineEngine`] driven by tokio timers.
//!
//! ## Stages
//!
//! - **Lane**: one task runs prepare, seek, preroll and stop completions in
//!   issue order, each after its configured latency. Seeks therefore
//!   complete in the order they were issued.
//! - **Clock**: while started, a task renders one frame per
//!   `frame_interval` (shortened by the decode speed-up). Every frame passes
//!   through the codec input pool and the codec output pool following the
//!   buffer ownership protocol.
//! - **Network monitor**: remote sources report every cache level change of
//!   the [`NetworkModel`] as `BufferingPercent`. A starved cache stalls the
//!   clock without stopping it.
//!
//! All tasks end when the engine is released.

use crate::config::SimulatedEngineConfig;
use crate::network::NetworkModel;
use async_trait::async_trait;
use bridge_traits::{
    BridgeError, EngineNotification, EngineOptions, EngineState, NotificationSink,
    PipelineEngine, Result, SeekMode,
};
use bytes::Bytes;
use core_buffer::{
    BufferFlags, BufferHandle, BufferInfo, BufferPool, PoolDirection, PoolOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const CODEC_CONFIG: &[u8] = b"\x00\x00\x00\x01\x67\x42\xc0\x1e";
const FRAME_PAYLOAD: &[u8] = &[0u8; 64];
const SYNC_FRAME_EVERY: u64 = 30;

/// Engine command as received, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Prepare,
    Start,
    Pause,
    Stop,
    Seek(Duration, SeekMode),
    Flush,
    Preroll,
    SetRate(f32),
    SelectTrack(usize),
    SetDecodeSpeedup(Option<f32>),
    Release,
}

enum LaneTask {
    Prepare,
    Seek(Duration),
    Preroll,
    Stop,
}

struct Pipeline {
    state: EngineState,
    position: Duration,
    rate: f32,
    speedup: Option<f32>,
    selected_track: Option<usize>,
    clock: Option<CancellationToken>,
    frames: u64,
    codec_configured: bool,
    monitoring_network: bool,
    released: bool,
}

struct EngineInner {
    config: SimulatedEngineConfig,
    remote: bool,
    sink: Arc<dyn NotificationSink>,
    network: NetworkModel,
    runtime: Handle,
    shutdown: CancellationToken,
    lane: mpsc::UnboundedSender<LaneTask>,
    pipeline: Mutex<Pipeline>,
    /// Serializes buffer exchanges against flushes.
    stage: Mutex<()>,
    commands: Mutex<Vec<EngineCommand>>,
    input: BufferPool,
    output: BufferPool,
}

/// Timer-driven engine for tests, demos and hosts without native codecs.
pub struct SimulatedEngine {
    inner: Arc<EngineInner>,
}

impl SimulatedEngine {
    /// Build an engine and start its lane task on the current runtime.
    pub fn spawn(
        config: SimulatedEngineConfig,
        remote: bool,
        options: EngineOptions,
        sink: Arc<dyn NotificationSink>,
        network: NetworkModel,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| {
            BridgeError::NotAvailable("simulated engine requires a tokio runtime".to_string())
        })?;

        let input = BufferPool::with_options(
            "codec-input",
            PoolDirection::Production,
            PoolOptions::default()
                .strict(options.strict_buffer_ownership)
                .max_slots(config.input_slots.max(1)),
        );
        let output = BufferPool::with_options(
            "codec-output",
            PoolDirection::Consumption,
            PoolOptions::default()
                .strict(options.strict_buffer_ownership)
                .max_slots(config.output_slots.max(1)),
        );

        let (lane, lane_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(EngineInner {
            config,
            remote,
            sink,
            network,
            runtime,
            shutdown: CancellationToken::new(),
            lane,
            pipeline: Mutex::new(Pipeline {
                state: EngineState::Idle,
                position: Duration::ZERO,
                rate: 1.0,
                speedup: None,
                selected_track: None,
                clock: None,
                frames: 0,
                codec_configured: false,
                monitoring_network: false,
                released: false,
            }),
            stage: Mutex::new(()),
            commands: Mutex::new(Vec::new()),
            input,
            output,
        });

        inner.runtime.spawn(run_lane(inner.clone(), lane_rx));
        debug!(remote, "simulated engine created");
        Ok(Arc::new(Self { inner }))
    }

    pub fn state(&self) -> EngineState {
        self.inner.pipeline.lock().state
    }

    pub fn position(&self) -> Duration {
        self.inner.pipeline.lock().position
    }

    pub fn rate(&self) -> f32 {
        self.inner.pipeline.lock().rate
    }

    pub fn decode_speedup(&self) -> Option<f32> {
        self.inner.pipeline.lock().speedup
    }

    pub fn selected_track(&self) -> Option<usize> {
        self.inner.pipeline.lock().selected_track
    }

    pub fn is_rendering(&self) -> bool {
        self.inner.pipeline.lock().clock.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.inner.pipeline.lock().released
    }

    pub fn frames_rendered(&self) -> u64 {
        self.inner.pipeline.lock().frames
    }

    /// Every command received so far.
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.inner.commands.lock().clone()
    }

    pub fn input_pool(&self) -> &BufferPool {
        &self.inner.input
    }

    pub fn output_pool(&self) -> &BufferPool {
        &self.inner.output
    }

    fn record(&self, command: EngineCommand) {
        trace!(?command, "engine command");
        self.inner.commands.lock().push(command);
    }

    fn enqueue(&self, task: LaneTask) -> Result<()> {
        self.inner
            .lane
            .send(task)
            .map_err(|_| BridgeError::OperationFailed("engine lane closed".to_string()))
    }

    fn begin_prepare(&self) -> Result<()> {
        let mut p = self.inner.live()?;
        match p.state {
            EngineState::Idle | EngineState::Stopped => {
                p.state = EngineState::Preparing;
                Ok(())
            }
            state => Err(BridgeError::OperationFailed(format!(
                "prepare not possible while {:?}",
                state
            ))),
        }
    }

    fn begin_start(&self) -> Result<bool> {
        let mut p = self.inner.live()?;
        match p.state {
            EngineState::Idle | EngineState::Preparing => Err(BridgeError::OperationFailed(
                format!("start not possible while {:?}", p.state),
            )),
            state => {
                p.state = EngineState::Started;
                self.inner.start_clock(&mut p);
                Ok(state != EngineState::Started)
            }
        }
    }

    fn begin_pause(&self) -> Result<bool> {
        let mut p = self.inner.live()?;
        stop_clock(&mut p);
        if p.state == EngineState::Started {
            p.state = EngineState::Paused;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn begin_seek(&self, position: Duration) -> Result<Duration> {
        let mut p = self.inner.live()?;
        let Some(duration) = self.inner.config.duration else {
            return Err(BridgeError::InvalidParameter(
                "live stream is not seekable".to_string(),
            ));
        };
        let target = position.min(duration);
        p.position = target;
        Ok(target)
    }
}

impl EngineInner {
    /// Lock the pipeline, failing once released.
    fn live(&self) -> Result<parking_lot::MutexGuard<'_, Pipeline>> {
        let p = self.pipeline.lock();
        if p.released {
            Err(BridgeError::Released)
        } else {
            Ok(p)
        }
    }

    fn start_clock(self: &Arc<Self>, p: &mut Pipeline) {
        if p.clock.is_some() {
            return;
        }
        let token = self.shutdown.child_token();
        p.clock = Some(token.clone());
        self.runtime.spawn(run_clock(self.clone(), token));
    }

    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn finish_prepare(self: &Arc<Self>) {
        if let Some((code, message)) = &self.config.prepare_error {
            warn!(code, %message, "simulated prepare failure");
            self.sink.notify(EngineNotification::Error {
                code: *code,
                message: message.clone(),
            });
            return;
        }

        let start_monitor = {
            let Ok(mut p) = self.live() else { return };
            if p.state != EngineState::Preparing {
                return;
            }
            if !p.codec_configured {
                if let Err(e) = self.queue_codec_config().and_then(|_| self.configure_pools()) {
                    warn!(error = %e, "codec configuration failed");
                    self.sink.notify(EngineNotification::Error {
                        code: -1,
                        message: e.to_string(),
                    });
                    return;
                }
                p.codec_configured = true;
            }
            p.state = EngineState::Prepared;
            let start_monitor = self.remote && !p.monitoring_network;
            p.monitoring_network |= start_monitor;
            start_monitor
        };

        self.sink
            .notify(EngineNotification::MediaInfo(self.config.media_info()));
        self.sink
            .notify(EngineNotification::StateChanged(EngineState::Prepared));
        if start_monitor {
            self.runtime.spawn(run_network_monitor(self.clone()));
        }
    }

    fn queue_codec_config(&self) -> core_buffer::Result<()> {
        let _stage = self.stage.lock();
        let index = self
            .input
            .on_buffer_ready(BufferHandle::new(0, Bytes::from_static(CODEC_CONFIG)))?;
        self.input.get_buffer(index)?;
        self.input
            .queue_codec_config(index, BufferInfo::new(Duration::ZERO, CODEC_CONFIG.len()))
    }

    /// Announce every codec slot, hand them all downstream and fix the slot
    /// count. Input handle 0 already carries the codec config.
    fn configure_pools(&self) -> core_buffer::Result<()> {
        let _stage = self.stage.lock();
        for id in 1..self.config.input_slots.max(1) as u64 {
            self.input
                .on_buffer_ready(BufferHandle::new(id, Bytes::from_static(FRAME_PAYLOAD)))?;
        }
        for id in 0..self.config.output_slots.max(1) as u64 {
            self.output.on_buffer_ready(BufferHandle::opaque(id))?;
        }
        self.input.flush();
        self.output.flush();
        self.input.freeze();
        self.output.freeze();
        debug!(
            input = self.input.len(),
            output = self.output.len(),
            "codec pools configured"
        );
        Ok(())
    }

    /// Render one frame. Returns `false` once the clock must stop.
    fn render_frame(&self, token: &CancellationToken) -> bool {
        let (position, frame, end_of_stream) = {
            let mut p = self.pipeline.lock();
            if token.is_cancelled() || p.released {
                return false;
            }
            let mut next = p.position + self.config.frame_interval.mul_f32(p.rate);
            let mut end_of_stream = false;
            if let Some(duration) = self.config.duration {
                if next >= duration {
                    next = duration;
                    end_of_stream = true;
                    p.clock = None;
                }
            }
            p.position = next;
            p.frames += 1;
            (next, p.frames, end_of_stream)
        };

        if let Err(e) = self.exchange_buffers(frame, position, end_of_stream) {
            warn!(error = %e, frame, "buffer exchange failed");
        }
        self.sink
            .notify(EngineNotification::PositionChanged(position));
        if end_of_stream {
            debug!(position_ms = position.as_millis() as u64, "end of stream");
            self.sink.notify(EngineNotification::EndOfStream);
        }
        !end_of_stream
    }

    /// Push one frame through codec input and codec output.
    fn exchange_buffers(
        &self,
        frame: u64,
        position: Duration,
        end_of_stream: bool,
    ) -> core_buffer::Result<()> {
        let _stage = self.stage.lock();
        let mut flags = BufferFlags::empty();
        if frame % SYNC_FRAME_EVERY == 1 {
            flags.insert(BufferFlags::SYNC_FRAME);
        }
        if end_of_stream {
            flags.insert(BufferFlags::END_OF_STREAM);
        }
        let info = BufferInfo::new(position, FRAME_PAYLOAD.len());

        let input_id = frame % self.config.input_slots.max(1) as u64;
        let index = self
            .input
            .on_buffer_ready(BufferHandle::new(input_id, Bytes::from_static(FRAME_PAYLOAD)))?;
        self.input.get_buffer(index)?;
        self.input.queue_buffer(index, info, flags)?;

        let output_id = frame % self.config.output_slots.max(1) as u64;
        let index = self.output.on_buffer_ready_with(
            BufferHandle::opaque(output_id),
            info,
            flags,
        )?;
        self.output.get_buffer(index)?;
        self.output.return_buffer(index)
    }

    fn flush_pools(&self) -> usize {
        let _stage = self.stage.lock();
        self.input.flush() + self.output.flush()
    }
}

fn stop_clock(p: &mut Pipeline) {
    if let Some(token) = p.clock.take() {
        token.cancel();
    }
}

fn frame_delay(interval: Duration, speedup: Option<f32>) -> Duration {
    match speedup {
        Some(factor) if factor > 1.0 => interval.div_f32(factor),
        _ => interval,
    }
}

async fn run_lane(inner: Arc<EngineInner>, mut rx: mpsc::UnboundedReceiver<LaneTask>) {
    loop {
        let task = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            task = rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        match task {
            LaneTask::Prepare => {
                if !inner.sleep(inner.config.prepare_latency).await {
                    break;
                }
                inner.finish_prepare();
            }
            LaneTask::Seek(position) => {
                if !inner.sleep(inner.config.seek_latency).await {
                    break;
                }
                inner.sink.notify(EngineNotification::SeekDone { position });
            }
            LaneTask::Preroll => {
                let position = inner.pipeline.lock().position;
                inner
                    .sink
                    .notify(EngineNotification::PositionChanged(position));
            }
            LaneTask::Stop => {
                if !inner.sleep(inner.config.stop_latency).await {
                    break;
                }
                if !inner.config.confirm_stop {
                    debug!("stop confirmation withheld");
                    continue;
                }
                let confirmed = match inner.live() {
                    Ok(mut p) => {
                        p.state = EngineState::Stopped;
                        true
                    }
                    Err(_) => false,
                };
                if confirmed {
                    inner
                        .sink
                        .notify(EngineNotification::StateChanged(EngineState::Stopped));
                }
            }
        }
    }
    trace!("engine lane stopped");
}

async fn run_clock(inner: Arc<EngineInner>, token: CancellationToken) {
    loop {
        let delay = {
            let p = inner.pipeline.lock();
            frame_delay(inner.config.frame_interval, p.speedup)
        };
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        if inner.remote && inner.network.is_starved() {
            trace!("render stalled on empty cache");
            continue;
        }
        if !inner.render_frame(&token) {
            break;
        }
    }
}

async fn run_network_monitor(inner: Arc<EngineInner>) {
    let mut rx = inner.network.subscribe();
    let initial = *rx.borrow_and_update();
    inner
        .sink
        .notify(EngineNotification::BufferingPercent(initial));

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let percent = *rx.borrow_and_update();
                inner.sink.notify(EngineNotification::BufferingPercent(percent));
            }
        }
    }
}

#[async_trait]
impl PipelineEngine for SimulatedEngine {
    async fn prepare(&self) -> Result<()> {
        self.record(EngineCommand::Prepare);
        self.begin_prepare()?;
        self.inner
            .sink
            .notify(EngineNotification::StateChanged(EngineState::Preparing));
        self.enqueue(LaneTask::Prepare)
    }

    async fn start(&self) -> Result<()> {
        self.record(EngineCommand::Start);
        if self.begin_start()? {
            self.inner
                .sink
                .notify(EngineNotification::StateChanged(EngineState::Started));
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.record(EngineCommand::Pause);
        if self.begin_pause()? {
            self.inner
                .sink
                .notify(EngineNotification::StateChanged(EngineState::Paused));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record(EngineCommand::Stop);
        {
            let mut p = self.inner.live()?;
            stop_clock(&mut p);
        }
        self.enqueue(LaneTask::Stop)
    }

    async fn seek(&self, position: Duration, mode: SeekMode) -> Result<()> {
        self.record(EngineCommand::Seek(position, mode));
        let target = self.begin_seek(position)?;
        self.enqueue(LaneTask::Seek(target))
    }

    async fn flush(&self) -> Result<()> {
        self.record(EngineCommand::Flush);
        drop(self.inner.live()?);
        let moved = self.inner.flush_pools();
        trace!(moved, "pipeline flushed");
        Ok(())
    }

    async fn set_rate(&self, rate: f32) -> Result<()> {
        self.record(EngineCommand::SetRate(rate));
        if !rate.is_finite() || rate <= 0.0 {
            return Err(BridgeError::InvalidParameter(format!(
                "unsupported rate {}",
                rate
            )));
        }
        self.inner.live()?.rate = rate;
        Ok(())
    }

    async fn select_track(&self, index: usize) -> Result<()> {
        self.record(EngineCommand::SelectTrack(index));
        if !self.inner.config.tracks.iter().any(|t| t.index == index) {
            return Err(BridgeError::InvalidParameter(format!(
                "no track {}",
                index
            )));
        }
        self.inner.live()?.selected_track = Some(index);
        self.inner
            .sink
            .notify(EngineNotification::TrackChanged(index));
        Ok(())
    }

    async fn preroll(&self) -> Result<()> {
        self.record(EngineCommand::Preroll);
        drop(self.inner.live()?);
        self.enqueue(LaneTask::Preroll)
    }

    async fn set_decode_speedup(&self, factor: Option<f32>) -> Result<()> {
        self.record(EngineCommand::SetDecodeSpeedup(factor));
        self.inner.live()?.speedup = factor;
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        {
            let mut p = self.inner.pipeline.lock();
            if p.released {
                return Ok(());
            }
            p.released = true;
            p.state = EngineState::Idle;
            stop_clock(&mut p);
        }
        self.record(EngineCommand::Release);
        self.inner.shutdown.cancel();
        debug!("simulated engine released");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
