use serde::Serialize;

use crate::models::{Criterion, PoolStatus};

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort a scoring call or a whole decision cycle.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid pairwise matrix: {reason}")]
    InvalidMatrix { reason: String },

    #[error("invalid criterion weights: {reason}")]
    InvalidWeights { reason: String },

    #[error("invalid criteria row for course {course_id}: {reason}")]
    InvalidCriteriaRow { course_id: String, reason: String },

    #[error("dimension mismatch: expected {expected} criteria, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown pool status encoding {0}, expected 1, 0 or -1")]
    UnknownStatus(i16),

    #[error("course {course_id} is {status:?}, only resting courses can be re-admitted")]
    NotResting {
        course_id: String,
        status: PoolStatus,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("invalid config value for {field}: {message}")]
    ValidationFailed { field: String, message: String },

    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Conditions absorbed with a documented default. A cycle records them and keeps going.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    EmptyBatch,
    MissingHistoryDefault { course_id: String, default: f64 },
    MissingPopularityDefault { course_id: String, default: f64 },
    MissingSurveyDefault { course_id: String, default: f64 },
    DegenerateScaleDefault { criterion: Criterion },
}

impl Diagnostic {
    pub fn describe(&self) -> String {
        match self {
            Diagnostic::EmptyBatch => "no rankable courses in this batch".to_string(),
            Diagnostic::MissingHistoryDefault { course_id, default } => {
                format!("{course_id}: no success history, using neutral {default:.2}")
            }
            Diagnostic::MissingPopularityDefault { course_id, default } => {
                format!("{course_id}: no popularity record, using {default:.0}")
            }
            Diagnostic::MissingSurveyDefault { course_id, default } => {
                format!("{course_id}: no survey result, using {default:.0}")
            }
            Diagnostic::DegenerateScaleDefault { criterion } => {
                format!("{criterion}: every value is zero, column normalized to 0")
            }
        }
    }

    pub fn log(&self) {
        tracing::warn!(diagnostic = %self.describe(), "absorbed with default");
    }
}
