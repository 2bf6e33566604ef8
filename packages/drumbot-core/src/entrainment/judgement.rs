//! Judgement history types
//!
//! The hit-detection collaborator judges every pad hit against the score and
//! hands over the full history once per completed loop. Controllers only read
//! the signed timing errors out of it.

use serde::{Deserialize, Serialize};

use crate::error::DrumbotError;
use crate::score::TrackName;

/// Quality grade assigned to a hit (or a missing hit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JudgementKind {
    Perfect,
    Great,
    Good,
    Miss,
    /// Note passed with no hit at all.
    Dropped,
    #[serde(other)]
    Other,
}

/// One judged note.
///
/// `error_ms` is the signed hit time minus the ideal note time (positive =
/// late). It is `None` when there was nothing to measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    pub pad: TrackName,
    #[serde(default)]
    pub error_ms: Option<f64>,
    pub judgement: JudgementKind,
}

impl Judgement {
    pub fn hit(pad: TrackName, error_ms: f64, judgement: JudgementKind) -> Self {
        Self {
            pad,
            error_ms: Some(error_ms),
            judgement,
        }
    }

    pub fn dropped(pad: TrackName) -> Self {
        Self {
            pad,
            error_ms: None,
            judgement: JudgementKind::Dropped,
        }
    }
}

/// All judgements of one completed loop.
pub type LoopJudgements = Vec<Judgement>;

/// Parse a full history: a JSON array of loops, each an array of judgements.
pub fn history_from_json(source: &str) -> Result<Vec<LoopJudgements>, DrumbotError> {
    serde_json::from_str(source).map_err(|e| DrumbotError::History(e.to_string()))
}

/// Parse one loop's judgements (a JSON array).
pub fn loop_from_json(source: &str) -> Result<LoopJudgements, DrumbotError> {
    serde_json::from_str(source).map_err(|e| DrumbotError::History(e.to_string()))
}

/// Signed errors recorded for `track` in one loop.
pub fn errors_for<'a>(judgements: impl IntoIterator<Item = &'a Judgement>, track: TrackName) -> Vec<f64> {
    judgements
        .into_iter()
        .filter(|j| j.pad == track)
        .filter_map(|j| j.error_ms)
        .filter(|e| e.is_finite())
        .collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
