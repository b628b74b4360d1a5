use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::YearlyRate;

/// Weights by recency rank: most recent year first.
pub const RECENCY_WEIGHTS: [f64; 3] = [0.50, 0.30, 0.20];

/// Trend value used when a course has no success history at all.
pub const NO_HISTORY_TREND: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct TrendScore {
    pub value: f64,
    pub explanation: String,
    pub years_used: usize,
}

impl TrendScore {
    pub fn is_default(&self) -> bool {
        self.years_used == 0
    }
}

/// Collapses a success-rate history into one recency-weighted value.
///
/// Observations sharing a year are averaged first, then the three most recent
/// distinct years are weighted 0.5 / 0.3 / 0.2. With fewer years the weighted
/// sum is divided by the weights actually applied, so a single year scores as
/// its own rate.
pub fn score(history: &[YearlyRate]) -> TrendScore {
    let mut by_year: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for observation in history {
        let entry = by_year.entry(observation.year).or_insert((0.0, 0));
        entry.0 += observation.success_rate;
        entry.1 += 1;
    }

    if by_year.is_empty() {
        return TrendScore {
            value: NO_HISTORY_TREND,
            explanation: format!("trend: no history => neutral {NO_HISTORY_TREND:.4}"),
            years_used: 0,
        };
    }

    let mut weighted_sum = 0.0;
    let mut applied_weight = 0.0;
    let mut explanation = String::from("trend:");
    let mut years_used = 0;

    for ((year, (total, count)), weight) in by_year.iter().rev().zip(RECENCY_WEIGHTS) {
        let rate = total / *count as f64;
        weighted_sum += rate * weight;
        applied_weight += weight;
        years_used += 1;
        let _ = write!(explanation, " [{year}: {rate:.2} (x{weight:.2})]");
    }

    let value = weighted_sum / applied_weight;
    let _ = write!(explanation, " => {value:.4}");

    TrendScore {
        value,
        explanation,
        years_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(points: &[(i32, f64)]) -> Vec<YearlyRate> {
        points
            .iter()
            .map(|(year, success_rate)| YearlyRate {
                year: *year,
                success_rate: *success_rate,
            })
            .collect()
    }

    #[test]
    fn three_years_use_fixed_weights() {
        let trend = score(&rates(&[(2024, 0.8), (2023, 0.6), (2022, 0.4)]));
        assert!((trend.value - 0.66).abs() < 1e-12);
        assert_eq!(trend.years_used, 3);
    }

    #[test]
    fn input_order_does_not_matter() {
        let sorted = score(&rates(&[(2024, 0.8), (2023, 0.6), (2022, 0.4)]));
        let shuffled = score(&rates(&[(2022, 0.4), (2024, 0.8), (2023, 0.6)]));
        assert_eq!(sorted, shuffled);
    }

    #[test]
    fn only_three_most_recent_years_count() {
        let trend = score(&rates(&[
            (2024, 0.8),
            (2023, 0.6),
            (2022, 0.4),
            (2021, 0.0),
            (2020, 0.0),
        ]));
        assert!((trend.value - 0.66).abs() < 1e-12);
        assert!(!trend.explanation.contains("2021"));
    }

    #[test]
    fn single_year_scores_as_its_own_rate() {
        let trend = score(&rates(&[(2024, 0.72)]));
        assert!((trend.value - 0.72).abs() < 1e-12);
    }

    #[test]
    fn two_years_are_renormalized() {
        let trend = score(&rates(&[(2024, 1.0), (2023, 0.5)]));
        let expected = (1.0 * 0.5 + 0.5 * 0.3) / 0.8;
        assert!((trend.value - expected).abs() < 1e-12);
    }

    #[test]
    fn empty_history_is_neutral() {
        let trend = score(&[]);
        assert_eq!(trend.value, 0.5);
        assert!(trend.is_default());
    }

    #[test]
    fn terms_of_the_same_year_are_averaged() {
        let trend = score(&rates(&[(2024, 0.9), (2024, 0.7), (2023, 0.5)]));
        let expected = (0.8 * 0.5 + 0.5 * 0.3) / 0.8;
        assert!((trend.value - expected).abs() < 1e-12);
        assert_eq!(trend.years_used, 2);
    }

    #[test]
    fn explanation_lists_every_weighted_year() {
        let trend = score(&rates(&[(2024, 0.8), (2023, 0.6), (2022, 0.4)]));
        assert_eq!(
            trend.explanation,
            "trend: [2024: 0.80 (x0.50)] [2023: 0.60 (x0.30)] [2022: 0.40 (x0.20)] => 0.6600"
        );
    }

    #[test]
    fn scoring_is_repeatable() {
        let history = rates(&[(2024, 0.55), (2022, 0.35)]);
        assert_eq!(score(&history), score(&history));
    }
}
