use std::collections::BTreeMap;

use crate::models::{SurveyBallot, SurveyResult};

/// Intensity assumed when a ballot leaves it blank.
pub const DEFAULT_INTENSITY: i32 = 5;

/// Borda points for a ranked choice: 1st = 3, 2nd = 2, 3rd = 1.
pub fn borda_points(rank: i32) -> Option<f64> {
    match rank {
        1 => Some(3.0),
        2 => Some(2.0),
        3 => Some(1.0),
        _ => None,
    }
}

/// Points one ballot contributes: Borda points scaled by intensity / 5.
pub fn ballot_points(ballot: &SurveyBallot) -> Option<f64> {
    let intensity = ballot.intensity.unwrap_or(DEFAULT_INTENSITY).clamp(1, 5);
    borda_points(ballot.rank).map(|points| points * intensity as f64 / 5.0)
}

#[derive(Default)]
struct Tally {
    total: f64,
    votes: usize,
    intensity_sum: f64,
}

/// Aggregates ballots per (form, course).
///
/// `normalized_score` is the course's share of the best total on the same
/// form, scaled to 0..=100.
pub fn aggregate(ballots: &[SurveyBallot], academic_year: i32) -> Vec<SurveyResult> {
    let mut tallies: BTreeMap<(i64, String), Tally> = BTreeMap::new();

    for ballot in ballots {
        let Some(points) = ballot_points(ballot) else {
            tracing::debug!(
                form_id = ballot.form_id,
                course_id = %ballot.course_id,
                rank = ballot.rank,
                "ignoring ballot with rank outside 1..=3"
            );
            continue;
        };
        let intensity = ballot.intensity.unwrap_or(DEFAULT_INTENSITY).clamp(1, 5);
        let tally = tallies
            .entry((ballot.form_id, ballot.course_id.clone()))
            .or_default();
        tally.total += points;
        tally.votes += 1;
        tally.intensity_sum += intensity as f64;
    }

    let mut form_max: BTreeMap<i64, f64> = BTreeMap::new();
    for ((form_id, _), tally) in &tallies {
        let best = form_max.entry(*form_id).or_insert(0.0);
        *best = best.max(tally.total);
    }

    tallies
        .into_iter()
        .map(|((form_id, course_id), tally)| {
            let best = form_max.get(&form_id).copied().unwrap_or(0.0);
            let normalized_score = if best > 0.0 {
                tally.total / best * 100.0
            } else {
                0.0
            };
            SurveyResult {
                course_id,
                form_id,
                academic_year,
                total_score: tally.total,
                vote_count: tally.votes,
                mean_intensity: tally.intensity_sum / tally.votes as f64,
                normalized_score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(student: &str, course: &str, rank: i32, intensity: Option<i32>) -> SurveyBallot {
        SurveyBallot {
            form_id: 7,
            student_key: student.to_string(),
            course_id: course.to_string(),
            rank,
            intensity,
        }
    }

    #[test]
    fn borda_points_follow_rank() {
        assert_eq!(borda_points(1), Some(3.0));
        assert_eq!(borda_points(2), Some(2.0));
        assert_eq!(borda_points(3), Some(1.0));
        assert_eq!(borda_points(4), None);
    }

    #[test]
    fn intensity_scales_points() {
        assert_eq!(ballot_points(&ballot("s1", "A", 1, Some(5))), Some(3.0));
        assert!((ballot_points(&ballot("s1", "A", 1, Some(2))).unwrap() - 1.2).abs() < 1e-12);
        assert_eq!(ballot_points(&ballot("s1", "A", 2, None)), Some(2.0));
    }

    #[test]
    fn aggregates_per_course_and_normalizes_to_best() {
        let ballots = vec![
            ballot("s1", "ROBOTICS", 1, Some(5)),
            ballot("s1", "ANTENNAS", 2, Some(5)),
            ballot("s2", "ROBOTICS", 1, Some(5)),
            ballot("s2", "ANTENNAS", 3, Some(5)),
            ballot("s3", "ANTENNAS", 9, Some(5)),
        ];
        let results = aggregate(&ballots, 2025);
        assert_eq!(results.len(), 2);

        let robotics = results.iter().find(|r| r.course_id == "ROBOTICS").unwrap();
        assert_eq!(robotics.total_score, 6.0);
        assert_eq!(robotics.vote_count, 2);
        assert_eq!(robotics.normalized_score, 100.0);
        assert_eq!(robotics.academic_year, 2025);

        let antennas = results.iter().find(|r| r.course_id == "ANTENNAS").unwrap();
        assert_eq!(antennas.total_score, 3.0);
        assert_eq!(antennas.vote_count, 2);
        assert_eq!(antennas.normalized_score, 50.0);
        assert_eq!(antennas.mean_intensity, 5.0);
    }

    #[test]
    fn no_ballots_no_results() {
        assert!(aggregate(&[], 2025).is_empty());
    }
}
