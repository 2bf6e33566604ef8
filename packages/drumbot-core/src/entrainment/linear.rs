//! Linear corrector
//!
//! After a short observation window, every loop re-measures where the
//! performer actually is and places the robot a fixed fraction of the way from
//! there back toward the score: `offset = mean(latest errors) * (1 - rate)`.
//! A track with no measured hits lets its offset decay toward zero.

use tracing::debug;

use super::judgement::{errors_for, mean, LoopJudgements};
use super::state::{EntrainmentState, LoopSummary};
use super::{Entrainment, GuidedTiming};
use crate::config::LinearConfig;
use crate::score::TrackName;

#[derive(Debug, Clone)]
pub struct LinearCorrector {
    config: LinearConfig,
    state: EntrainmentState,
}

impl LinearCorrector {
    pub fn new(config: LinearConfig) -> Self {
        Self {
            config,
            state: EntrainmentState::default(),
        }
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }
}

impl Entrainment for LinearCorrector {
    fn name(&self) -> &'static str {
        "Linear corrector"
    }

    fn guided_timing(&self, track: TrackName, ideal_ms: f64) -> GuidedTiming {
        let offset = self.state.offsets_ms.get(track);
        if offset.abs() <= self.config.deadband_ms {
            return GuidedTiming::unchanged(ideal_ms);
        }
        let guided = ideal_ms + offset;
        GuidedTiming {
            time_ms: guided,
            log: Some(format!(
                "[{}] Ideal: {:.0}ms + Offset: {:+.1}ms -> Guided: {:.0}ms",
                track, ideal_ms, offset, guided
            )),
        }
    }

    fn update_performance_data(&mut self, history: &[LoopJudgements]) -> Option<String> {
        let latest = history.last()?;
        let loop_index = history.len() - 1;
        self.state.loop_count = history.len();
        self.state.record(LoopSummary::from_loop(loop_index, latest));

        if loop_index < self.config.analysis_loops {
            return Some(format!("Loop {}: initial data collection", loop_index));
        }

        self.state.intervention_active = true;
        let mut status = Vec::new();
        for track in TrackName::ALL {
            let errors = errors_for(latest, track);
            match mean(&errors) {
                Some(user_error) => {
                    let offset = user_error * (1.0 - self.config.correction_rate);
                    self.state.offsets_ms.set(track, offset);
                    status.push(format!("{}: User={:+.0}ms -> Robot={:+.0}ms", track, user_error, offset));
                }
                None => {
                    let decayed = self.state.offsets_ms.get(track) * self.config.decay_factor;
                    self.state.offsets_ms.set(track, decayed);
                }
            }
        }

        let status = if status.is_empty() {
            "No input".to_string()
        } else {
            status.join(", ")
        };
        let log = format!(
            "Loop {}: {} (Rate: {:.0}%)",
            loop_index,
            status,
            self.config.correction_rate * 100.0
        );
        debug!(controller = "linear", "{}", log);
        Some(log)
    }

    fn reset(&mut self) {
        self.state = EntrainmentState::default();
    }

    fn state(&self) -> EntrainmentState {
        self.state.clone()
    }
}
