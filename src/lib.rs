pub mod error;
pub mod session;

pub use error::*;
pub use session::{replay_history, JudgementFeed, PracticeSession, ReplayStep};

use std::fs;
use std::path::{Path, PathBuf};

use drumbot_core::{RigConfig, Score};

/// Where a practice score comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreSource {
    /// A JSON score on disk
    File(PathBuf),
    /// A score embedded in `drumbot-scores`, by name
    Demo(String),
}

impl ScoreSource {
    /// Read, parse and validate the score.
    pub fn load(&self) -> Result<Score, SessionError> {
        match self {
            ScoreSource::File(path) => Ok(Score::from_json(&read_to_string(path)?)?),
            ScoreSource::Demo(name) => {
                let demo = drumbot_scores::get_score(name).ok_or_else(|| SessionError::UnknownDemo {
                    name: name.clone(),
                    available: drumbot_scores::list_scores().join(", "),
                })?;
                Ok(demo.parse()?)
            }
        }
    }
}

/// Load the rig file, or the built-in rig defaults when no path is given.
pub fn load_rig_config(path: Option<&Path>) -> Result<RigConfig, SessionError> {
    match path {
        Some(path) => Ok(RigConfig::from_yaml(&read_to_string(path)?)?),
        None => Ok(RigConfig::default()),
    }
}

fn read_to_string(path: &Path) -> Result<String, SessionError> {
    fs::read_to_string(path).map_err(|source| SessionError::Read {
        path: path.display().to_string(),
        source,
    })
}
