use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::topsis::Ranking;

/// Admission rule applied to a ranked batch.
///
/// A course is admitted when its closeness clears the absolute bar OR the
/// batch mean. Either bar can be switched off, not both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    pub absolute_bar: Option<f64>,
    pub use_batch_mean: bool,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            absolute_bar: Some(0.50),
            use_batch_mean: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Admission {
    pub admitted: BTreeSet<String>,
    pub batch_mean: Option<f64>,
}

impl ThresholdPolicy {
    pub fn is_active(&self) -> bool {
        self.absolute_bar.is_some() || self.use_batch_mean
    }

    pub fn admits(&self, closeness: f64, batch_mean: Option<f64>) -> bool {
        let over_bar = self.absolute_bar.is_some_and(|bar| closeness >= bar);
        let over_mean = self.use_batch_mean && batch_mean.is_some_and(|mean| closeness >= mean);
        over_bar || over_mean
    }

    pub fn apply(&self, ranking: &Ranking) -> Admission {
        let batch_mean = ranking.mean_closeness();
        let admitted = ranking
            .courses
            .iter()
            .filter(|course| self.admits(course.closeness, batch_mean))
            .map(|course| course.course_id.clone())
            .collect();
        Admission {
            admitted,
            batch_mean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RankedCourse;

    fn ranking(scores: &[(&str, f64)]) -> Ranking {
        Ranking {
            courses: scores
                .iter()
                .map(|(course_id, closeness)| RankedCourse {
                    course_id: course_id.to_string(),
                    closeness: *closeness,
                    distance_to_best: 0.0,
                    distance_to_worst: 0.0,
                })
                .collect(),
            ..Ranking::default()
        }
    }

    #[test]
    fn weak_batch_admits_above_mean() {
        let admission =
            ThresholdPolicy::default().apply(&ranking(&[("A", 0.45), ("B", 0.35), ("C", 0.10)]));
        assert!(admission.admitted.contains("A"));
        assert!(admission.admitted.contains("B"));
        assert!(!admission.admitted.contains("C"));
        assert!((admission.batch_mean.unwrap() - 0.30).abs() < 1e-12);
    }

    #[test]
    fn strong_batch_still_admits_over_absolute_bar() {
        let admission =
            ThresholdPolicy::default().apply(&ranking(&[("A", 0.95), ("B", 0.90), ("C", 0.55)]));
        assert_eq!(admission.admitted.len(), 3);
    }

    #[test]
    fn absolute_bar_only() {
        let policy = ThresholdPolicy {
            absolute_bar: Some(0.6),
            use_batch_mean: false,
        };
        let admission = policy.apply(&ranking(&[("A", 0.7), ("B", 0.4), ("C", 0.1)]));
        assert_eq!(admission.admitted.into_iter().collect::<Vec<_>>(), vec!["A"]);
    }

    #[test]
    fn empty_ranking_admits_nothing() {
        let admission = ThresholdPolicy::default().apply(&Ranking::default());
        assert!(admission.admitted.is_empty());
        assert_eq!(admission.batch_mean, None);
    }

    #[test]
    fn inactive_policy_is_detected() {
        let policy = ThresholdPolicy {
            absolute_bar: None,
            use_batch_mean: false,
        };
        assert!(!policy.is_active());
        assert!(!policy.admits(1.0, Some(0.0)));
    }
}
