//! Criterion weights from a pairwise comparison matrix (AHP).
//!
//! `matrix[i][j]` says how many times more important criterion `i` is than
//! criterion `j`. Weights come from the normalized-column-sum approximation of
//! the principal eigenvector:
//!
//! 1. sum every column,
//! 2. divide each entry by its column sum,
//! 3. average each row.

use std::fmt::Write;

use crate::error::{EngineError, EngineResult};

/// Allowed drift of `m[i][j] * m[j][i]` from 1, so configs may write `0.333` for `1/3`.
pub const RECIPROCAL_TOLERANCE: f64 = 1e-2;

#[derive(Debug, Clone, PartialEq)]
pub struct AhpSolution {
    pub weights: Vec<f64>,
    pub column_sums: Vec<f64>,
    pub audit: Vec<String>,
}

pub fn solve(matrix: &[Vec<f64>]) -> EngineResult<Vec<f64>> {
    Ok(solve_with_audit(matrix)?.weights)
}

pub fn solve_with_audit(matrix: &[Vec<f64>]) -> EngineResult<AhpSolution> {
    validate(matrix)?;
    let n = matrix.len();
    let mut audit = Vec::new();

    audit.push(format!("pairwise matrix ({n}x{n}):"));
    for row in matrix {
        audit.push(format!("  {}", format_row(row)));
    }

    let column_sums: Vec<f64> = (0..n)
        .map(|col| matrix.iter().map(|row| row[col]).sum())
        .collect();
    audit.push(format!("column sums: {}", format_row(&column_sums)));

    let mut weights = Vec::with_capacity(n);
    for (index, row) in matrix.iter().enumerate() {
        let normalized: Vec<f64> = row
            .iter()
            .zip(&column_sums)
            .map(|(value, sum)| value / sum)
            .collect();
        let weight = normalized.iter().sum::<f64>() / n as f64;
        audit.push(format!(
            "criterion {index}: normalized {} -> weight {weight:.4}",
            format_row(&normalized)
        ));
        weights.push(weight);
    }

    tracing::debug!(?weights, "derived AHP weights");

    Ok(AhpSolution {
        weights,
        column_sums,
        audit,
    })
}

/// Scales explicit weights so they sum to 1.
pub fn normalize_fixed(weights: &[f64]) -> EngineResult<Vec<f64>> {
    if weights.is_empty() {
        return Err(EngineError::InvalidWeights {
            reason: "no weights given".to_string(),
        });
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(EngineError::InvalidWeights {
            reason: format!("weight {bad} is negative or not finite"),
        });
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(EngineError::InvalidWeights {
            reason: "weights sum to zero".to_string(),
        });
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

fn validate(matrix: &[Vec<f64>]) -> EngineResult<()> {
    let n = matrix.len();
    if n < 2 {
        return Err(EngineError::InvalidMatrix {
            reason: format!("need at least 2 criteria, got {n}"),
        });
    }

    for (i, row) in matrix.iter().enumerate() {
        if row.len() != n {
            return Err(EngineError::InvalidMatrix {
                reason: format!("row {i} has {} entries, expected {n}", row.len()),
            });
        }
        for (j, value) in row.iter().enumerate() {
            if !value.is_finite() || *value <= 0.0 {
                return Err(EngineError::InvalidMatrix {
                    reason: format!("entry [{i}][{j}] = {value} is not a positive number"),
                });
            }
        }
    }

    for i in 0..n {
        if (matrix[i][i] - 1.0).abs() > RECIPROCAL_TOLERANCE {
            return Err(EngineError::InvalidMatrix {
                reason: format!("diagonal entry [{i}][{i}] = {} must be 1", matrix[i][i]),
            });
        }
        for j in (i + 1)..n {
            let product = matrix[i][j] * matrix[j][i];
            if (product - 1.0).abs() > RECIPROCAL_TOLERANCE {
                return Err(EngineError::InvalidMatrix {
                    reason: format!(
                        "entries [{i}][{j}] = {} and [{j}][{i}] = {} are not reciprocal",
                        matrix[i][j], matrix[j][i]
                    ),
                });
            }
        }
    }

    Ok(())
}

fn format_row(values: &[f64]) -> String {
    let mut out = String::from("[");
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{value:.4}");
    }
    out.push(']');
    out
}
