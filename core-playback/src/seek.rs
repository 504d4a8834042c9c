//! # Seek & Track-Switch Coordinator
//!
//! Computes the engine command sequence for a seek in the current state and
//! tracks outstanding seeks so that only the latest completion is reported.
//!
//! ## Ordering
//!
//! Every seek gets a ticket with a monotonically increasing sequence number.
//! Engines complete seeks in the order they were issued, so each `SeekDone`
//! pops the oldest ticket. A completion whose ticket is not the newest one
//! has been superseded and is discarded.
//!
//! ## Accurate seeks
//!
//! `Closest` seeks raise the engine's decode speed while intermediate frames
//! are drained. The [`AccurateSeek`] helper tracks the seek until the engine
//! confirmed it and a frame at or after the target was presented.

use crate::state::PlaybackState;
use bridge_traits::SeekMode;
use std::collections::VecDeque;
use std::time::Duration;

/// Why a seek was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeekTrigger {
    /// `seek()` from the caller; the only trigger that surfaces `SeekDone`.
    User,
    TrackSwitch,
    RateChange,
    /// End of stream with looping enabled.
    Loop,
    /// Implicit repositioning by `play()` from `Stopped` or `PlaybackCompleted`.
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    pub position: Duration,
    pub mode: SeekMode,
    pub trigger: SeekTrigger,
}

impl SeekRequest {
    pub fn new(position: Duration, mode: SeekMode, trigger: SeekTrigger) -> Self {
        Self {
            position,
            mode,
            trigger,
        }
    }

    pub fn user(position: Duration, mode: SeekMode) -> Self {
        Self::new(position, mode, SeekTrigger::User)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTicket {
    pub seq: u64,
    pub request: SeekRequest,
}

/// One engine command of a seek plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStep {
    Pause,
    Flush,
    Seek,
    Preroll,
    Start,
}

/// Ordered engine commands plus the session state to enter afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekPlan {
    pub steps: Vec<SeekStep>,
    pub next_state: Option<PlaybackState>,
}

/// Facts about the session that shape a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanContext {
    pub pipeline_running: bool,
    pub preroll_on_paused_seek: bool,
    /// At completion the source was remote and the pipeline still running.
    pub completed_while_streaming: bool,
}

impl SeekPlan {
    /// Plan for a seek issued in `state`. Returns `None` if no seek is
    /// possible from that state.
    pub fn for_state(state: PlaybackState, ctx: PlanContext) -> Option<Self> {
        let plan = match state {
            PlaybackState::Prepared => Self {
                steps: vec![SeekStep::Flush, SeekStep::Seek],
                next_state: None,
            },
            PlaybackState::Playing => {
                let mut steps = Vec::with_capacity(4);
                if ctx.pipeline_running {
                    steps.push(SeekStep::Pause);
                }
                steps.extend([SeekStep::Flush, SeekStep::Seek, SeekStep::Start]);
                Self {
                    steps,
                    next_state: None,
                }
            }
            PlaybackState::Paused => {
                let mut steps = vec![SeekStep::Flush, SeekStep::Seek];
                if ctx.preroll_on_paused_seek {
                    steps.push(SeekStep::Preroll);
                }
                Self {
                    steps,
                    next_state: None,
                }
            }
            PlaybackState::PlaybackCompleted => {
                if ctx.completed_while_streaming {
                    Self {
                        steps: vec![SeekStep::Flush, SeekStep::Seek, SeekStep::Start],
                        next_state: Some(PlaybackState::Playing),
                    }
                } else {
                    Self {
                        steps: vec![SeekStep::Flush, SeekStep::Seek],
                        next_state: Some(PlaybackState::Paused),
                    }
                }
            }
            _ => return None,
        };
        Some(plan)
    }

    /// Reposition and start playing; used by `play()` after stop or
    /// completion.
    pub fn restart() -> Self {
        Self {
            steps: vec![SeekStep::Flush, SeekStep::Seek, SeekStep::Start],
            next_state: Some(PlaybackState::Playing),
        }
    }
}

/// Transient helper for a frame-accurate seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccurateSeek {
    pub seq: u64,
    pub target: Duration,
    engine_done: bool,
}

/// Result of matching a `SeekDone` against outstanding tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekCompletion {
    /// The newest seek landed.
    Latest(SeekTicket),
    /// An older seek landed while a newer one is outstanding.
    Superseded(SeekTicket),
    /// No seek was outstanding.
    Unexpected,
}

#[derive(Debug, Default)]
pub struct SeekCoordinator {
    next_seq: u64,
    pending: VecDeque<SeekTicket>,
    accurate: Option<AccurateSeek>,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new seek. Any older ticket is superseded.
    pub fn issue(&mut self, request: SeekRequest) -> SeekTicket {
        self.next_seq += 1;
        let ticket = SeekTicket {
            seq: self.next_seq,
            request,
        };
        self.pending.push_back(ticket);
        ticket
    }

    pub fn on_seek_done(&mut self) -> SeekCompletion {
        let Some(ticket) = self.pending.pop_front() else {
            return SeekCompletion::Unexpected;
        };

        if let Some(helper) = self.accurate.as_mut() {
            if helper.seq == ticket.seq {
                helper.engine_done = true;
            }
        }

        if self.pending.is_empty() {
            SeekCompletion::Latest(ticket)
        } else {
            SeekCompletion::Superseded(ticket)
        }
    }

    /// Withdraw a seek the engine never accepted. Returns `true` if the
    /// accurate-seek helper belonged to it and the speed-up must be restored.
    pub fn abandon(&mut self, seq: u64) -> bool {
        self.pending.retain(|ticket| ticket.seq != seq);
        match self.accurate {
            Some(helper) if helper.seq == seq => {
                self.accurate = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn latest_seq(&self) -> u64 {
        self.next_seq
    }

    /// Attach an accurate-seek helper to `ticket`.
    ///
    /// Returns `true` if no helper was active, meaning the decode speed-up
    /// still has to be raised.
    pub fn start_accurate(&mut self, ticket: &SeekTicket) -> bool {
        let raise = self.accurate.is_none();
        self.accurate = Some(AccurateSeek {
            seq: ticket.seq,
            target: ticket.request.position,
            engine_done: false,
        });
        raise
    }

    /// Drop the helper. Returns `true` if one was active and the speed-up
    /// must be restored.
    pub fn cancel_accurate(&mut self) -> bool {
        self.accurate.take().is_some()
    }

    pub fn accurate(&self) -> Option<AccurateSeek> {
        self.accurate
    }

    /// Feed a presented frame position to the helper. Returns `true` once the
    /// helper is finished and has been torn down.
    pub fn on_frame_presented(&mut self, position: Duration) -> bool {
        match self.accurate {
            Some(helper) if helper.engine_done && position >= helper.target => {
                self.accurate = None;
                true
            }
            _ => false,
        }
    }

    /// Forget every outstanding seek and the helper. Sequence numbers keep
    /// increasing.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.accurate = None;
    }
}
