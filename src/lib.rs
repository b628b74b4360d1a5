//! Elective pool decision engine: AHP criterion weights, TOPSIS ranking,
//! trend scoring and the year-over-year pool lifecycle, plus the Postgres
//! layer the `elective-pool` CLI runs on.

pub mod ahp;
pub mod config;
pub mod cycle;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod report;
pub mod selection;
pub mod survey;
pub mod topsis;
pub mod trend;

pub use config::EngineConfig;
pub use cycle::{CycleInput, CycleOutput, DecisionCycle};
pub use error::{ConfigError, Diagnostic, EngineError, EngineResult};
pub use topsis::Ranking;
