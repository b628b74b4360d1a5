//! TOPSIS ranking over a batch of criteria rows.
//!
//! Every criterion is a benefit criterion. The ideal and anti-ideal profiles are
//! the column maxima and minima of the current batch, so they move with each
//! cycle.

use std::cmp::Ordering;

use crate::error::{Diagnostic, EngineError, EngineResult};
use crate::models::{CriteriaTable, RankedCourse};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ranking {
    /// Sorted by closeness descending, ties by course id ascending.
    pub courses: Vec<RankedCourse>,
    pub ideal_best: Vec<f64>,
    pub ideal_worst: Vec<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Ranking {
    pub fn mean_closeness(&self) -> Option<f64> {
        if self.courses.is_empty() {
            return None;
        }
        let total: f64 = self.courses.iter().map(|course| course.closeness).sum();
        Some(total / self.courses.len() as f64)
    }

    pub fn position(&self, course_id: &str) -> Option<usize> {
        self.courses
            .iter()
            .position(|course| course.course_id == course_id)
    }
}

pub fn rank(table: &CriteriaTable, weights: &[f64]) -> EngineResult<Ranking> {
    let criteria = table.criteria();
    if weights.len() != criteria.len() {
        return Err(EngineError::DimensionMismatch {
            expected: criteria.len(),
            actual: weights.len(),
        });
    }

    if table.is_empty() {
        tracing::warn!("ranking requested for an empty batch");
        return Ok(Ranking {
            diagnostics: vec![Diagnostic::EmptyBatch],
            ..Ranking::default()
        });
    }

    let mut diagnostics = Vec::new();
    let columns = criteria.len();

    let mut denominators = Vec::with_capacity(columns);
    for (col, criterion) in criteria.iter().enumerate() {
        let sum_of_squares: f64 = table.rows().iter().map(|row| row.values()[col].powi(2)).sum();
        if sum_of_squares > 0.0 {
            denominators.push(sum_of_squares.sqrt());
        } else {
            let diagnostic = Diagnostic::DegenerateScaleDefault {
                criterion: *criterion,
            };
            diagnostic.log();
            diagnostics.push(diagnostic);
            denominators.push(1.0);
        }
    }

    let weighted: Vec<Vec<f64>> = table
        .rows()
        .iter()
        .map(|row| {
            row.values()
                .iter()
                .zip(&denominators)
                .zip(weights)
                .map(|((value, denominator), weight)| value / denominator * weight)
                .collect()
        })
        .collect();

    let mut ideal_best = vec![f64::NEG_INFINITY; columns];
    let mut ideal_worst = vec![f64::INFINITY; columns];
    for row in &weighted {
        for (col, value) in row.iter().enumerate() {
            ideal_best[col] = ideal_best[col].max(*value);
            ideal_worst[col] = ideal_worst[col].min(*value);
        }
    }

    let mut courses: Vec<RankedCourse> = table
        .rows()
        .iter()
        .zip(&weighted)
        .map(|(row, values)| {
            let distance_to_best = euclidean(values, &ideal_best);
            let distance_to_worst = euclidean(values, &ideal_worst);
            let spread = distance_to_best + distance_to_worst;
            let closeness = if spread == 0.0 {
                0.0
            } else {
                distance_to_worst / spread
            };
            RankedCourse {
                course_id: row.course_id.clone(),
                closeness,
                distance_to_best,
                distance_to_worst,
            }
        })
        .collect();

    courses.sort_by(compare_ranked);

    tracing::debug!(
        courses = courses.len(),
        criteria = columns,
        "ranked batch"
    );

    Ok(Ranking {
        courses,
        ideal_best,
        ideal_worst,
        diagnostics,
    })
}

fn compare_ranked(a: &RankedCourse, b: &RankedCourse) -> Ordering {
    b.closeness
        .total_cmp(&a.closeness)
        .then_with(|| a.course_id.cmp(&b.course_id))
}

fn euclidean(values: &[f64], target: &[f64]) -> f64 {
    values
        .iter()
        .zip(target)
        .map(|(value, ideal)| (value - ideal).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Criterion;

    fn table(rows: &[(&str, [f64; 3])]) -> CriteriaTable {
        let mut table = CriteriaTable::new(vec![
            Criterion::Success,
            Criterion::Popularity,
            Criterion::Survey,
        ]);
        for (course_id, values) in rows {
            table.push(*course_id, values.to_vec()).unwrap();
        }
        table
    }

    #[test]
    fn empty_batch_returns_empty_ranking() {
        let ranking = rank(&table(&[]), &[0.5, 0.3, 0.2]).unwrap();
        assert!(ranking.courses.is_empty());
        assert_eq!(ranking.diagnostics, vec![Diagnostic::EmptyBatch]);
        assert_eq!(ranking.mean_closeness(), None);
    }

    #[test]
    fn single_row_has_zero_closeness() {
        let ranking = rank(&table(&[("EE401", [0.8, 40.0, 70.0])]), &[0.5, 0.3, 0.2]).unwrap();
        assert_eq!(ranking.courses.len(), 1);
        assert_eq!(ranking.courses[0].closeness, 0.0);
        assert_eq!(ranking.courses[0].distance_to_best, 0.0);
        assert_eq!(ranking.courses[0].distance_to_worst, 0.0);
    }

    #[test]
    fn dominant_course_reaches_one_and_dominated_reaches_zero() {
        let ranking = rank(
            &table(&[
                ("MID", [0.6, 30.0, 60.0]),
                ("TOP", [0.9, 50.0, 90.0]),
                ("LOW", [0.2, 10.0, 20.0]),
            ]),
            &[0.5, 0.3, 0.2],
        )
        .unwrap();
        let order: Vec<&str> = ranking
            .courses
            .iter()
            .map(|course| course.course_id.as_str())
            .collect();
        assert_eq!(order, vec!["TOP", "MID", "LOW"]);
        assert!((ranking.courses[0].closeness - 1.0).abs() < 1e-12);
        assert_eq!(ranking.courses[2].closeness, 0.0);
    }

    #[test]
    fn all_zero_column_is_flagged_and_ignored() {
        let ranking = rank(
            &table(&[("A", [0.9, 0.0, 50.0]), ("B", [0.4, 0.0, 50.0])]),
            &[0.5, 0.3, 0.2],
        )
        .unwrap();
        assert_eq!(
            ranking.diagnostics,
            vec![Diagnostic::DegenerateScaleDefault {
                criterion: Criterion::Popularity
            }]
        );
        assert_eq!(ranking.courses[0].course_id, "A");
        assert!(ranking.courses.iter().all(|c| c.closeness.is_finite()));
    }

    #[test]
    fn ties_are_broken_by_course_id() {
        let ranking = rank(
            &table(&[
                ("ZETA", [0.5, 20.0, 50.0]),
                ("ALPHA", [0.5, 20.0, 50.0]),
                ("MU", [0.5, 20.0, 50.0]),
            ]),
            &[0.5, 0.3, 0.2],
        )
        .unwrap();
        let order: Vec<&str> = ranking
            .courses
            .iter()
            .map(|course| course.course_id.as_str())
            .collect();
        assert_eq!(order, vec!["ALPHA", "MU", "ZETA"]);
        assert!(ranking.courses.iter().all(|c| c.closeness == 0.0));
    }

    #[test]
    fn weight_count_must_match_criteria() {
        let err = rank(&table(&[("A", [0.1, 1.0, 2.0])]), &[0.5, 0.5]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn closeness_stays_in_unit_interval() {
        let ranking = rank(
            &table(&[
                ("A", [0.91, 12.0, 40.0]),
                ("B", [0.35, 80.0, 75.0]),
                ("C", [0.66, 45.0, 10.0]),
                ("D", [0.10, 5.0, 99.0]),
            ]),
            &[0.4, 0.35, 0.25],
        )
        .unwrap();
        for course in &ranking.courses {
            assert!((0.0..=1.0).contains(&course.closeness));
        }
        let closeness: Vec<f64> = ranking.courses.iter().map(|c| c.closeness).collect();
        assert!(closeness.windows(2).all(|pair| pair[0] >= pair[1]));
    }
}
