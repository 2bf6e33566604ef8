use thiserror::Error;

use drumbot_core::DrumbotError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No embedded score named '{name}' (available: {available})")]
    UnknownDemo { name: String, available: String },

    #[error("Reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] DrumbotError),
}
