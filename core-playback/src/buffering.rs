//! Network buffering controller.
//!
//! Tracks cache fill notifications and decides when the pipeline has to be
//! paused or resumed independently of what the user asked for. The
//! controller only computes decisions; the session applies them to the
//! engine.

/// Snapshot of the buffering bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferingState {
    pub cache_percent: u8,
    pub is_buffering: bool,
    pub low_percent: u8,
    pub high_percent: u8,
    /// Set by `pause()`, cleared only by `play()`.
    pub is_user_paused: bool,
    /// The pipeline was paused by a buffering episode rather than the user.
    pub auto_paused: bool,
}

/// Inputs the session supplies with every cache update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineContext {
    /// Session state is `Playing`.
    pub intent_playing: bool,
    /// The engine render clock is currently running.
    pub pipeline_running: bool,
}

/// What the session must do in response to a cache update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferingDecision {
    /// Nothing changed.
    Unchanged,
    Progress { percent: u8 },
    Start { percent: u8, pause_pipeline: bool },
    End { percent: u8, resume_pipeline: bool },
}

#[derive(Debug, Clone)]
pub struct BufferingController {
    state: BufferingState,
}

impl BufferingController {
    pub fn new(low_percent: u8, high_percent: u8) -> Self {
        Self {
            state: BufferingState {
                cache_percent: 100,
                is_buffering: false,
                low_percent,
                high_percent,
                is_user_paused: false,
                auto_paused: false,
            },
        }
    }

    pub fn state(&self) -> BufferingState {
        self.state
    }

    pub fn is_buffering(&self) -> bool {
        self.state.is_buffering
    }

    pub fn is_user_paused(&self) -> bool {
        self.state.is_user_paused
    }

    pub fn set_user_paused(&mut self, paused: bool) {
        self.state.is_user_paused = paused;
        if paused {
            self.state.auto_paused = false;
        }
    }

    pub fn cache_percent(&self) -> u8 {
        self.state.cache_percent
    }

    /// Apply a cache fill update.
    pub fn on_cache_percent_changed(
        &mut self,
        percent: u8,
        ctx: PipelineContext,
    ) -> BufferingDecision {
        let percent = percent.min(100);
        let previous = self.state.cache_percent;
        self.state.cache_percent = percent;

        if !self.state.is_buffering && percent < self.state.low_percent {
            self.state.is_buffering = true;
            let pause_pipeline =
                ctx.intent_playing && ctx.pipeline_running && !self.state.is_user_paused;
            self.state.auto_paused = pause_pipeline;
            return BufferingDecision::Start {
                percent,
                pause_pipeline,
            };
        }

        if self.state.is_buffering && percent >= self.state.high_percent {
            self.state.is_buffering = false;
            self.state.auto_paused = false;
            let resume_pipeline =
                ctx.intent_playing && !ctx.pipeline_running && !self.state.is_user_paused;
            return BufferingDecision::End {
                percent,
                resume_pipeline,
            };
        }

        if percent == previous {
            BufferingDecision::Unchanged
        } else {
            BufferingDecision::Progress { percent }
        }
    }

    /// Forget the current episode. User intent is cleared as well; used on
    /// stop and reset.
    pub fn reset(&mut self) {
        let low = self.state.low_percent;
        let high = self.state.high_percent;
        *self = Self::new(low, high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYING: PipelineContext = PipelineContext {
        intent_playing: true,
        pipeline_running: true,
    };

    #[test]
    fn default_tuning_treats_ten_percent_as_low() {
        let tuning = core_runtime::config::PlaybackTuning::default();
        let mut ctl =
            BufferingController::new(tuning.buffering_low_percent, tuning.buffering_high_percent);
        assert_eq!(
            ctl.on_cache_percent_changed(10, PLAYING),
            BufferingDecision::Start {
                percent: 10,
                pause_pipeline: true
            }
        );
    }

    #[test]
    fn enters_buffering_once_per_episode() {
        let mut ctl = BufferingController::new(10, 100);
        assert_eq!(
            ctl.on_cache_percent_changed(5, PLAYING),
            BufferingDecision::Start {
                percent: 5,
                pause_pipeline: true
            }
        );
        let paused = PipelineContext {
            pipeline_running: false,
            ..PLAYING
        };
        assert_eq!(
            ctl.on_cache_percent_changed(3, paused),
            BufferingDecision::Progress { percent: 3 }
        );
        assert_eq!(
            ctl.on_cache_percent_changed(3, paused),
            BufferingDecision::Unchanged
        );
        assert!(ctl.is_buffering());
        assert!(ctl.state().auto_paused);
    }

    #[test]
    fn exits_at_high_threshold_and_resumes() {
        let mut ctl = BufferingController::new(10, 100);
        ctl.on_cache_percent_changed(9, PLAYING);
        let paused = PipelineContext {
            pipeline_running: false,
            ..PLAYING
        };
        assert_eq!(
            ctl.on_cache_percent_changed(99, paused),
            BufferingDecision::Progress { percent: 99 }
        );
        assert_eq!(
            ctl.on_cache_percent_changed(100, paused),
            BufferingDecision::End {
                percent: 100,
                resume_pipeline: true
            }
        );
        assert!(!ctl.is_buffering());
    }

    #[test]
    fn user_pause_survives_cache_refill() {
        let mut ctl = BufferingController::new(10, 100);
        ctl.on_cache_percent_changed(5, PLAYING);
        ctl.set_user_paused(true);

        let user_paused = PipelineContext {
            intent_playing: false,
            pipeline_running: false,
        };
        assert_eq!(
            ctl.on_cache_percent_changed(100, user_paused),
            BufferingDecision::End {
                percent: 100,
                resume_pipeline: false
            }
        );
        assert!(ctl.is_user_paused());
    }

    #[test]
    fn user_paused_session_does_not_pause_pipeline() {
        let mut ctl = BufferingController::new(10, 100);
        ctl.set_user_paused(true);
        let decision = ctl.on_cache_percent_changed(
            2,
            PipelineContext {
                intent_playing: false,
                pipeline_running: false,
            },
        );
        assert_eq!(
            decision,
            BufferingDecision::Start {
                percent: 2,
                pause_pipeline: false
            }
        );
    }

    #[test]
    fn reset_clears_episode_and_intent() {
        let mut ctl = BufferingController::new(20, 90);
        ctl.on_cache_percent_changed(1, PLAYING);
        ctl.set_user_paused(true);
        ctl.reset();
        let state = ctl.state();
        assert!(!state.is_buffering);
        assert!(!state.is_user_paused);
        assert_eq!(state.low_percent, 20);
        assert_eq!(state.high_percent, 90);
    }

    #[test]
    fn percent_is_clamped() {
        let mut ctl = BufferingController::new(10, 100);
        ctl.on_cache_percent_changed(5, PLAYING);
        assert!(matches!(
            ctl.on_cache_percent_changed(250, PLAYING),
            BufferingDecision::End { percent: 100, .. }
        ));
    }
}
