//! Error type shared by the Rota crates
//!
//! Store-level failures only. Scheduling and kiosk outcomes have their own
//! taxonomy in `rota_sched::error`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored or externally supplied value could not be decoded
    #[error("Malformed {kind}: '{value}'")]
    Malformed { kind: &'static str, value: String },

    /// Shift interval is empty or reversed
    #[error("Shift {shift} must end after it starts ({start} >= {end})")]
    ShiftInterval {
        shift: String,
        start: String,
        end: String,
    },

    /// JSON column could not be written
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn malformed(kind: &'static str, value: impl Into<String>) -> Self {
        Error::Malformed {
            kind,
            value: value.into(),
        }
    }
}
