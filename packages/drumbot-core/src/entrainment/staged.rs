//! Linear-staged corrector
//!
//! A repeating tighten-then-release cycle:
//!
//! ```text
//! COLLECTING ──(loop == analysis_loops)──▶ ESTABLISHED ──(loop >= intervention_start_loop)──▶ INTERVENING
//!     ▲                                                                                        │
//!     └──────────────────── both |offset| < convergence epsilon (loop counter rebased) ────────┘
//! ```
//!
//! - COLLECTING only logs.
//! - ESTABLISHED averages every error seen since the cycle began and sets the
//!   per-track offset once. The offset is not applied yet.
//! - INTERVENING applies the offset and shrinks both tracks' offsets by
//!   `(1 - correction_rate)` each loop until they converge, after which the
//!   cycle restarts relative to the current loop.

use serde::Serialize;
use tracing::{debug, info};

use super::judgement::{errors_for, mean, LoopJudgements};
use super::state::{EntrainmentState, LoopSummary, TrackOffsets};
use super::{Entrainment, GuidedTiming};
use crate::config::StagedConfig;
use crate::score::TrackName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StagedPhase {
    Collecting,
    Established,
    Intervening,
}

#[derive(Debug, Clone)]
pub struct StagedCorrector {
    config: StagedConfig,
    state: EntrainmentState,
}

impl StagedCorrector {
    pub fn new(config: StagedConfig) -> Self {
        Self {
            config,
            state: EntrainmentState::default(),
        }
    }

    pub fn config(&self) -> &StagedConfig {
        &self.config
    }

    /// Phase for a loop index relative to the current cycle.
    pub fn phase_of(&self, cycle_loop: usize) -> StagedPhase {
        if cycle_loop < self.config.analysis_loops {
            StagedPhase::Collecting
        } else if cycle_loop < self.config.intervention_start_loop {
            StagedPhase::Established
        } else {
            StagedPhase::Intervening
        }
    }

    /// Phase the controller is in after the most recent update.
    pub fn phase(&self) -> StagedPhase {
        if self.state.intervention_active {
            return StagedPhase::Intervening;
        }
        match self.state.loop_count.checked_sub(self.state.loop_offset + 1) {
            Some(cycle_loop) => self.phase_of(cycle_loop),
            None => StagedPhase::Collecting,
        }
    }

    fn establish(&mut self, cycle: &[LoopJudgements]) -> String {
        for track in TrackName::ALL {
            let errors = errors_for(cycle.iter().flatten(), track);
            if let Some(average) = mean(&errors) {
                self.state.offsets_ms.set(track, average);
            }
        }
        format!(
            "Analysis complete. Initial offset set: top={:.1}ms, bottom={:.1}ms",
            self.state.offsets_ms.top, self.state.offsets_ms.bottom
        )
    }

    fn intervene(&mut self, cycle_loop: usize, absolute_loops: usize) -> String {
        self.state.intervention_active = true;
        self.state.offsets_ms.scale(1.0 - self.config.correction_rate);

        let log = format!(
            "Loop {}: Intervention active. Reducing offset by {:.0}%. Current offset: top={:.2}ms, bottom={:.2}ms",
            cycle_loop,
            self.config.correction_rate * 100.0,
            self.state.offsets_ms.top,
            self.state.offsets_ms.bottom
        );

        if self.state.offsets_ms.max_abs() < self.config.convergence_epsilon_ms {
            info!(loop_count = absolute_loops, "offset converged; restarting analysis cycle");
            self.state.intervention_active = false;
            self.state.offsets_ms = TrackOffsets::default();
            self.state.loop_offset = absolute_loops;
            return "Offset converged. Restarting analysis phase.".to_string();
        }
        log
    }
}

impl Entrainment for StagedCorrector {
    fn name(&self) -> &'static str {
        "Linear-staged corrector"
    }

    fn guided_timing(&self, track: TrackName, ideal_ms: f64) -> GuidedTiming {
        let offset = self.state.offsets_ms.get(track);
        if !self.state.intervention_active || offset.abs() <= self.config.deadband_ms {
            return GuidedTiming::unchanged(ideal_ms);
        }
        let guided = ideal_ms + offset;
        GuidedTiming {
            time_ms: guided,
            log: Some(format!(
                "Intervention: Ideal {:.0}ms. Applying offset {:+.1}ms. New time: {:.0}ms",
                ideal_ms, offset, guided
            )),
        }
    }

    fn update_performance_data(&mut self, history: &[LoopJudgements]) -> Option<String> {
        let latest = history.last()?;
        let absolute_loops = history.len();
        self.state.loop_count = absolute_loops;
        self.state.record(LoopSummary::from_loop(absolute_loops - 1, latest));

        // A history shorter than the rebase point means the caller restarted it.
        if self.state.loop_offset >= absolute_loops {
            self.state.loop_offset = 0;
        }
        let cycle = &history[self.state.loop_offset..];
        let cycle_loop = cycle.len() - 1;

        let log = if cycle_loop < self.config.analysis_loops {
            Some(format!("Loop {}: Data collection phase", cycle_loop))
        } else {
            let mut messages = Vec::new();
            if cycle_loop == self.config.analysis_loops {
                messages.push(self.establish(cycle));
            }
            // intervention_start_loop may equal analysis_loops
            if cycle_loop >= self.config.intervention_start_loop {
                messages.push(self.intervene(cycle_loop, absolute_loops));
            }
            if messages.is_empty() {
                None
            } else {
                Some(messages.join(" | "))
            }
        };
        if let Some(message) = &log {
            debug!(controller = "staged", "{}", message);
        }
        log
    }

    fn reset(&mut self) {
        self.state = EntrainmentState::default();
    }

    fn state(&self) -> EntrainmentState {
        self.state.clone()
    }
}
