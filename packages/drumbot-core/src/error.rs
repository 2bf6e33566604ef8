//! # Error Types
//!
//! This module defines all error types for the drumbot core library.
//!
//! Errors are scoped the same way failures are scoped at runtime: a malformed
//! score or config is rejected before anything moves, while connection and
//! hardware errors belong to one actuator and never stop its siblings.
//!
//! ## Error Types
//! - `Score` - Score content that cannot be defaulted (negative bpm, zero denominator, ...)
//! - `History` - Judgement history that does not decode
//! - `Calibration` - Calibration table that exists but cannot be read
//! - `Config` - Invalid rig configuration
//! - `Connection` - Actuator could not be opened on its port
//! - `Hardware` - Actuator command failed mid-session
//! - `Protocol` - Malformed frame received from the actuator
//! - `Io` - Underlying file or port I/O
//!
//! ## Usage
//! ```rust
//! use drumbot_core::{Score, DrumbotError};
//!
//! match Score::from_json(r#"{"top": {"bpm": -3, "items": []}}"#) {
//!     Ok(_) => unreachable!(),
//!     Err(DrumbotError::Score(message)) => eprintln!("bad score: {}", message),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

use crate::score::TrackName;

#[derive(Error, Debug)]
pub enum DrumbotError {
    /// Score content that is present but invalid.
    ///
    /// Missing fields are defaulted silently; this is only raised for values
    /// that cannot be played at all.
    ///
    /// # Example
    /// ```
    /// # use drumbot_core::DrumbotError;
    /// let err = DrumbotError::Score("track 'top': bpm must be positive, got 0".to_string());
    /// assert_eq!(err.to_string(), "Invalid score: track 'top': bpm must be positive, got 0");
    /// ```
    #[error("Invalid score: {0}")]
    Score(String),

    /// Judgement history from the scoring collaborator that does not decode.
    #[error("Invalid judgement history: {0}")]
    History(String),

    /// A calibration table that exists but cannot be parsed.
    #[error("Calibration table {path}: {message}")]
    Calibration { path: String, message: String },

    /// Invalid rig configuration.
    ///
    /// # Example
    /// ```
    /// # use drumbot_core::DrumbotError;
    /// let err = DrumbotError::Config("correction_rate must be in (0, 1)".to_string());
    /// assert_eq!(err.to_string(), "Invalid configuration: correction_rate must be in (0, 1)");
    /// ```
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The actuator could not be opened.
    #[error("Could not connect to actuator on {port}: {message}")]
    Connection { port: String, message: String },

    /// An actuator command failed after connecting.
    #[error("Actuator [{track}] failed: {message}")]
    Hardware { track: TrackName, message: String },

    /// The actuator answered with a frame that does not decode.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DrumbotError {
    /// True for errors that end one actuator's session only.
    pub fn is_actuator_scoped(&self) -> bool {
        matches!(
            self,
            DrumbotError::Connection { .. } | DrumbotError::Hardware { .. } | DrumbotError::Protocol(_)
        )
    }
}
