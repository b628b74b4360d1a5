//! Engine configuration.
//!
//! Resolution order (highest priority first):
//! 1. Environment variables (`CURRICULUM_*`)
//! 2. TOML file passed on the command line
//! 3. Compiled defaults

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ahp;
use crate::error::{ConfigError, EngineResult};
use crate::lifecycle::ScoreMode;
use crate::models::Criterion;
use crate::selection::ThresholdPolicy;

pub const ENV_ABSOLUTE_BAR: &str = "CURRICULUM_ABSOLUTE_BAR";
pub const ENV_USE_BATCH_MEAN: &str = "CURRICULUM_USE_BATCH_MEAN";
pub const ENV_SCORE_MODE: &str = "CURRICULUM_SCORE_MODE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaConfig {
    #[serde(default = "default_order")]
    pub order: Vec<Criterion>,
    /// AHP pairwise comparison matrix over `order`.
    #[serde(default)]
    pub pairwise: Option<Vec<Vec<f64>>>,
    /// Explicit weights over `order`, used instead of `pairwise`.
    #[serde(default)]
    pub weights: Option<Vec<f64>>,
}

fn default_order() -> Vec<Criterion> {
    vec![
        Criterion::Success,
        Criterion::Trend,
        Criterion::Popularity,
        Criterion::Survey,
    ]
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            pairwise: Some(vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![1.0 / 2.0, 1.0, 2.0, 3.0],
                vec![1.0 / 3.0, 1.0 / 2.0, 1.0, 2.0],
                vec![1.0 / 4.0, 1.0 / 3.0, 1.0 / 2.0, 1.0],
            ]),
            weights: None,
        }
    }
}

impl CriteriaConfig {
    /// Success, popularity and survey without the trend column.
    pub fn three_criteria() -> Self {
        Self {
            order: vec![Criterion::Success, Criterion::Popularity, Criterion::Survey],
            pairwise: Some(vec![
                vec![1.0, 3.0, 4.0],
                vec![1.0 / 3.0, 1.0, 2.0],
                vec![1.0 / 4.0, 1.0 / 2.0, 1.0],
            ]),
            weights: None,
        }
    }
}

/// Neutral values used when a course has no data for a criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub success: f64,
    pub popularity: f64,
    pub survey: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            success: 0.5,
            popularity: 50.0,
            survey: 75.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub score_mode: ScoreMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub criteria: CriteriaConfig,
    pub selection: ThresholdPolicy,
    pub defaults: DefaultsConfig,
    pub lifecycle: LifecycleConfig,
}

/// Weights ready for ranking, with the audit trail of how they were derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWeights {
    pub criteria: Vec<Criterion>,
    pub weights: Vec<f64>,
    pub audit: Vec<String>,
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CURRICULUM_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_ABSOLUTE_BAR) {
            let raw = raw.trim();
            self.selection.absolute_bar = if raw.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(raw.parse().map_err(|_| ConfigError::ValidationFailed {
                    field: ENV_ABSOLUTE_BAR.to_string(),
                    message: format!("expected a number or `none`, got `{raw}`"),
                })?)
            };
        }
        if let Some(raw) = lookup(ENV_USE_BATCH_MEAN) {
            self.selection.use_batch_mean = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ConfigError::ValidationFailed {
                        field: ENV_USE_BATCH_MEAN.to_string(),
                        message: format!("expected true or false, got `{other}`"),
                    })
                }
            };
        }
        if let Some(raw) = lookup(ENV_SCORE_MODE) {
            self.lifecycle.score_mode =
                ScoreMode::parse(&raw).ok_or_else(|| ConfigError::ValidationFailed {
                    field: ENV_SCORE_MODE.to_string(),
                    message: format!("expected closeness or success_count, got `{raw}`"),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let order = &self.criteria.order;
        if order.len() < 2 {
            return Err(invalid("criteria.order", "list at least 2 criteria"));
        }
        let distinct: BTreeSet<_> = order.iter().collect();
        if distinct.len() != order.len() {
            return Err(invalid("criteria.order", "criteria must not repeat"));
        }

        match (&self.criteria.pairwise, &self.criteria.weights) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "criteria",
                    "set either `pairwise` or `weights`, not both",
                ))
            }
            (None, None) => return Err(invalid("criteria", "set `pairwise` or `weights`")),
            (Some(matrix), None) if matrix.len() != order.len() => {
                return Err(invalid(
                    "criteria.pairwise",
                    &format!("expected {n}x{n} matrix for {n} criteria", n = order.len()),
                ))
            }
            (None, Some(weights)) if weights.len() != order.len() => {
                return Err(invalid(
                    "criteria.weights",
                    &format!("expected {} weights", order.len()),
                ))
            }
            _ => {}
        }

        if !self.selection.is_active() {
            return Err(invalid(
                "selection",
                "enable `absolute_bar`, `use_batch_mean`, or both",
            ));
        }
        if let Some(bar) = self.selection.absolute_bar {
            if !(0.0..=1.0).contains(&bar) {
                return Err(invalid("selection.absolute_bar", "must be between 0.0 and 1.0"));
            }
        }

        let defaults = &self.defaults;
        if !(0.0..=1.0).contains(&defaults.success) {
            return Err(invalid("defaults.success", "must be between 0.0 and 1.0"));
        }
        if !defaults.popularity.is_finite() || defaults.popularity < 0.0 {
            return Err(invalid("defaults.popularity", "must be a non-negative number"));
        }
        if !(0.0..=100.0).contains(&defaults.survey) {
            return Err(invalid("defaults.survey", "must be between 0 and 100"));
        }

        Ok(())
    }

    /// Derives the criterion weights: AHP when a matrix is configured, else
    /// the explicit weights scaled to sum to 1.
    pub fn resolve_weights(&self) -> EngineResult<ResolvedWeights> {
        self.validate()?;
        let criteria = self.criteria.order.clone();
        let (weights, mut audit) = match (&self.criteria.pairwise, &self.criteria.weights) {
            (Some(matrix), _) => {
                let solution = ahp::solve_with_audit(matrix)?;
                (solution.weights, solution.audit)
            }
            (None, Some(fixed)) => (
                ahp::normalize_fixed(fixed)?,
                vec!["fixed weights from configuration".to_string()],
            ),
            (None, None) => {
                return Err(invalid("criteria", "set `pairwise` or `weights`").into())
            }
        };
        for (criterion, weight) in criteria.iter().zip(&weights) {
            audit.push(format!("w_{criterion} = {weight:.4}"));
        }
        Ok(ResolvedWeights {
            criteria,
            weights,
            audit,
        })
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationFailed {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::EngineError;

    #[test]
    fn defaults_validate_and_resolve() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        let resolved = config.resolve_weights().unwrap();
        assert_eq!(resolved.criteria.len(), 4);
        assert!((resolved.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(resolved.weights.windows(2).all(|pair| pair[0] > pair[1]));
    }

    #[test]
    fn three_criteria_preset_resolves() {
        let config = EngineConfig {
            criteria: CriteriaConfig::three_criteria(),
            ..EngineConfig::default()
        };
        let resolved = config.resolve_weights().unwrap();
        assert_eq!(
            resolved.criteria,
            vec![Criterion::Success, Criterion::Popularity, Criterion::Survey]
        );
    }

    #[test]
    fn parses_fixed_weights_from_toml() {
        let config = EngineConfig::from_toml(
            r#"
            [criteria]
            order = ["success", "trend", "popularity"]
            weights = [5.0, 3.0, 2.0]

            [selection]
            absolute_bar = 0.6
            use_batch_mean = false

            [lifecycle]
            score_mode = "success_count"
            "#,
        )
        .unwrap();
        assert_eq!(config.criteria.pairwise, None);
        assert_eq!(config.selection.absolute_bar, Some(0.6));
        assert_eq!(config.lifecycle.score_mode, ScoreMode::SuccessCount);
        assert_eq!(config.defaults, DefaultsConfig::default());
        let resolved = config.resolve_weights().unwrap();
        assert_eq!(resolved.weights, vec![0.5, 0.3, 0.2]);
    }

    #[test]
    fn rejects_both_matrix_and_weights() {
        let err = EngineConfig::from_toml(
            r#"
            [criteria]
            order = ["success", "survey"]
            pairwise = [[1.0, 2.0], [0.5, 1.0]]
            weights = [0.5, 0.5]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed { .. }));
    }

    #[test]
    fn rejects_matrix_of_wrong_size() {
        let err = EngineConfig::from_toml(
            r#"
            [criteria]
            order = ["success", "trend", "survey"]
            pairwise = [[1.0, 2.0], [0.5, 1.0]]
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::ValidationFailed { field, .. } => assert_eq!(field, "criteria.pairwise"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_reciprocal_matrix_fails_weight_resolution() {
        let mut config = EngineConfig::default();
        config.criteria = CriteriaConfig {
            order: vec![Criterion::Success, Criterion::Survey],
            pairwise: Some(vec![vec![1.0, 4.0], vec![4.0, 1.0]]),
            weights: None,
        };
        assert!(matches!(
            config.resolve_weights(),
            Err(EngineError::InvalidMatrix { .. })
        ));
    }

    #[test]
    fn rejects_disabled_selection() {
        let mut config = EngineConfig::default();
        config.selection = ThresholdPolicy {
            absolute_bar: None,
            use_batch_mean: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_toml() {
        let err = EngineConfig::from_toml("[criteria\norder = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_take_priority() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_ABSOLUTE_BAR, "none"),
            (ENV_USE_BATCH_MEAN, "true"),
            (ENV_SCORE_MODE, "success-count"),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|value| value.to_string()))
            .unwrap();
        assert_eq!(config.selection.absolute_bar, None);
        assert!(config.selection.use_batch_mean);
        assert_eq!(config.lifecycle.score_mode, ScoreMode::SuccessCount);
        config.validate().unwrap();
    }

    #[test]
    fn bad_env_override_is_reported() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_ABSOLUTE_BAR).then(|| "high".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed { .. }));
    }
}
