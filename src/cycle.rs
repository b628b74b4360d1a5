//! One planning cycle for a faculty: criteria table, weights, ranking,
//! admission, and the next pool entry for every elective course.
//!
//! All input arrives in a [`CycleInput`] snapshot and all updates leave in a
//! [`CycleOutput`]; nothing is written while the cycle computes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Diagnostic, EngineResult};
use crate::lifecycle::LifecycleManager;
use crate::models::{
    Course, CourseType, CriteriaTable, Criterion, CurriculumSnapshot, PerformanceRecord,
    PoolEntry, PoolStatus, PopularityRecord, RankedCourse, SurveyResult, YearlyRate,
};
use crate::topsis::{self, Ranking};
use crate::trend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleInput {
    pub faculty: String,
    /// The year being planned. History is read from earlier years only.
    pub academic_year: i32,
    pub courses: Vec<Course>,
    #[serde(default)]
    pub performance: Vec<PerformanceRecord>,
    #[serde(default)]
    pub popularity: Vec<PopularityRecord>,
    #[serde(default)]
    pub surveys: Vec<SurveyResult>,
    /// Pool entries from earlier years; the latest one per course is used.
    #[serde(default)]
    pub prior_entries: Vec<PoolEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionWeight {
    pub criterion: Criterion,
    pub weight: f64,
}

/// Raw signals gathered for one ranked course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAssessment {
    pub course_id: String,
    pub name: String,
    pub success: f64,
    pub trend: f64,
    pub popularity: f64,
    pub survey: f64,
    pub trend_explanation: String,
}

impl CourseAssessment {
    pub fn value(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Success => self.success,
            Criterion::Trend => self.trend,
            Criterion::Popularity => self.popularity,
            Criterion::Survey => self.survey,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub course_id: String,
    pub previous: Option<PoolStatus>,
    pub current: PoolStatus,
    pub miss_counter: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutput {
    pub faculty: String,
    pub academic_year: i32,
    pub weights: Vec<CriterionWeight>,
    pub weight_audit: Vec<String>,
    pub ranking: Vec<RankedCourse>,
    pub batch_mean: Option<f64>,
    pub assessments: Vec<CourseAssessment>,
    /// One entry per elective course of the faculty, ordered by course id.
    pub entries: Vec<PoolEntry>,
    pub changes: Vec<StatusChange>,
    pub snapshot: CurriculumSnapshot,
    pub diagnostics: Vec<Diagnostic>,
}

impl CycleOutput {
    pub fn entry(&self, course_id: &str) -> Option<&PoolEntry> {
        self.entries.iter().find(|entry| entry.course_id == course_id)
    }

    pub fn assessment(&self, course_id: &str) -> Option<&CourseAssessment> {
        self.assessments
            .iter()
            .find(|assessment| assessment.course_id == course_id)
    }
}

pub struct DecisionCycle {
    config: EngineConfig,
    lifecycle: LifecycleManager,
}

impl DecisionCycle {
    pub fn new(config: EngineConfig) -> Self {
        let lifecycle = LifecycleManager::new(config.lifecycle.score_mode);
        Self { config, lifecycle }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self, input: &CycleInput) -> EngineResult<CycleOutput> {
        let resolved = self.config.resolve_weights()?;
        let year = input.academic_year;

        let courses: BTreeMap<&str, &Course> = input
            .courses
            .iter()
            .filter(|course| course.faculty == input.faculty)
            .filter(|course| course.course_type == CourseType::Elective)
            .map(|course| (course.course_id.as_str(), course))
            .collect();

        let prior = latest_prior_entries(&input.prior_entries, year);

        tracing::info!(
            faculty = %input.faculty,
            academic_year = year,
            courses = courses.len(),
            "starting decision cycle"
        );

        let mut diagnostics = Vec::new();
        let mut assessments = Vec::new();
        let mut table = CriteriaTable::new(resolved.criteria.clone());

        for (course_id, course) in &courses {
            if prior.get(course_id).map(|entry| entry.status) == Some(PoolStatus::Resting) {
                tracing::debug!(course_id, "resting course skipped from ranking");
                continue;
            }
            let assessment = self.assess(course, input, &resolved.criteria, &mut diagnostics);
            let values = resolved
                .criteria
                .iter()
                .map(|criterion| assessment.value(*criterion))
                .collect();
            table.push(*course_id, values)?;
            assessments.push(assessment);
        }

        let ranking: Ranking = topsis::rank(&table, &resolved.weights)?;
        diagnostics.extend(ranking.diagnostics.iter().cloned());

        let admission = self.config.selection.apply(&ranking);
        let closeness: BTreeMap<&str, f64> = ranking
            .courses
            .iter()
            .map(|course| (course.course_id.as_str(), course.closeness))
            .collect();

        let mut entries = Vec::with_capacity(courses.len());
        let mut changes = Vec::new();
        for course_id in courses.keys() {
            let previous = prior.get(course_id).copied();
            let entry = self.lifecycle.advance(
                previous,
                course_id,
                year,
                admission.admitted.contains(*course_id),
                closeness.get(course_id).copied(),
            );
            let previous_status = previous.map(|entry| entry.status);
            if previous_status != Some(entry.status) {
                changes.push(StatusChange {
                    course_id: entry.course_id.clone(),
                    previous: previous_status,
                    current: entry.status,
                    miss_counter: entry.miss_counter,
                });
            }
            entries.push(entry);
        }

        let snapshot = CurriculumSnapshot::from_entries(&input.faculty, year, &entries);

        tracing::info!(
            faculty = %input.faculty,
            academic_year = year,
            ranked = ranking.courses.len(),
            admitted = snapshot.course_ids.len(),
            batch_mean = admission.batch_mean.unwrap_or(0.0),
            "decision cycle complete"
        );

        Ok(CycleOutput {
            faculty: input.faculty.clone(),
            academic_year: year,
            weights: resolved
                .criteria
                .iter()
                .zip(&resolved.weights)
                .map(|(criterion, weight)| CriterionWeight {
                    criterion: *criterion,
                    weight: *weight,
                })
                .collect(),
            weight_audit: resolved.audit,
            ranking: ranking.courses,
            batch_mean: admission.batch_mean,
            assessments,
            entries,
            changes,
            snapshot,
            diagnostics,
        })
    }

    fn assess(
        &self,
        course: &Course,
        input: &CycleInput,
        criteria: &[Criterion],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> CourseAssessment {
        let defaults = &self.config.defaults;
        let uses = |criterion: Criterion| criteria.contains(&criterion);
        let mut record = |diagnostic: Diagnostic| {
            diagnostic.log();
            diagnostics.push(diagnostic);
        };

        let yearly = yearly_success(&input.performance, &course.course_id, input.academic_year);
        let trend_score = trend::score(&yearly);
        let success = yearly.last().map_or(defaults.success, |rate| rate.success_rate);
        if yearly.is_empty() && (uses(Criterion::Success) || uses(Criterion::Trend)) {
            record(Diagnostic::MissingHistoryDefault {
                course_id: course.course_id.clone(),
                default: trend_score.value,
            });
        }

        let popularity =
            match latest_popularity(&input.popularity, &course.course_id, input.academic_year) {
                Some(count) => count,
                None => {
                    if uses(Criterion::Popularity) {
                        record(Diagnostic::MissingPopularityDefault {
                            course_id: course.course_id.clone(),
                            default: defaults.popularity,
                        });
                    }
                    defaults.popularity
                }
            };

        let survey = match survey_score(&input.surveys, &course.course_id, input.academic_year) {
            Some(score) => score,
            None => {
                if uses(Criterion::Survey) {
                    record(Diagnostic::MissingSurveyDefault {
                        course_id: course.course_id.clone(),
                        default: defaults.survey,
                    });
                }
                defaults.survey
            }
        };

        tracing::debug!(
            course_id = %course.course_id,
            success,
            trend = trend_score.value,
            popularity,
            survey,
            "assessed course"
        );

        CourseAssessment {
            course_id: course.course_id.clone(),
            name: course.name.clone(),
            success,
            trend: trend_score.value,
            popularity,
            survey,
            trend_explanation: trend_score.explanation,
        }
    }
}

/// Mean success rate per year before `before_year`, oldest first.
pub fn yearly_success(
    records: &[PerformanceRecord],
    course_id: &str,
    before_year: i32,
) -> Vec<YearlyRate> {
    let mut by_year: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|record| record.course_id == course_id && record.academic_year < before_year)
    {
        let entry = by_year.entry(record.academic_year).or_insert((0.0, 0));
        entry.0 += record.success_rate;
        entry.1 += 1;
    }
    by_year
        .into_iter()
        .map(|(year, (total, count))| YearlyRate {
            year,
            success_rate: total / count as f64,
        })
        .collect()
}

/// Preference count summed over the terms of the latest year before `before_year`.
pub fn latest_popularity(
    records: &[PopularityRecord],
    course_id: &str,
    before_year: i32,
) -> Option<f64> {
    let relevant: Vec<&PopularityRecord> = records
        .iter()
        .filter(|record| record.course_id == course_id && record.academic_year < before_year)
        .collect();
    let latest = relevant.iter().map(|record| record.academic_year).max()?;
    Some(
        relevant
            .iter()
            .filter(|record| record.academic_year == latest)
            .map(|record| record.preference_count as f64)
            .sum(),
    )
}

/// Mean normalized survey score over the forms run for `academic_year`.
pub fn survey_score(results: &[SurveyResult], course_id: &str, academic_year: i32) -> Option<f64> {
    let scores: Vec<f64> = results
        .iter()
        .filter(|result| result.course_id == course_id && result.academic_year == academic_year)
        .map(|result| result.normalized_score)
        .collect();
    if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

fn latest_prior_entries(entries: &[PoolEntry], academic_year: i32) -> BTreeMap<&str, &PoolEntry> {
    let mut latest: BTreeMap<&str, &PoolEntry> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| entry.academic_year < academic_year) {
        let slot = latest.entry(entry.course_id.as_str()).or_insert(entry);
        if entry.academic_year > slot.academic_year {
            *slot = entry;
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CriteriaConfig;

    fn course(id: &str, course_type: CourseType) -> Course {
        Course {
            course_id: id.to_string(),
            name: format!("Course {id}"),
            faculty: "Engineering".to_string(),
            course_type,
        }
    }

    fn performance(id: &str, year: i32, term: &str, rate: f64) -> PerformanceRecord {
        PerformanceRecord {
            course_id: id.to_string(),
            academic_year: year,
            term: term.to_string(),
            success_rate: rate,
            mean_grade: None,
            participant_count: None,
        }
    }

    fn popularity(id: &str, year: i32, term: &str, count: i64) -> PopularityRecord {
        PopularityRecord {
            course_id: id.to_string(),
            academic_year: year,
            term: term.to_string(),
            preference_count: count,
            preference_ratio: None,
        }
    }

    fn base_input() -> CycleInput {
        CycleInput {
            faculty: "Engineering".to_string(),
            academic_year: 2025,
            courses: vec![
                course("EE401", CourseType::Elective),
                course("EE402", CourseType::Elective),
                course("EE101", CourseType::Mandatory),
            ],
            performance: vec![
                performance("EE401", 2024, "fall", 0.9),
                performance("EE401", 2024, "spring", 0.7),
                performance("EE401", 2023, "fall", 0.8),
                performance("EE402", 2024, "fall", 0.3),
                performance("EE402", 2025, "fall", 1.0),
            ],
            popularity: vec![
                popularity("EE401", 2024, "fall", 40),
                popularity("EE401", 2024, "spring", 20),
                popularity("EE401", 2023, "fall", 500),
                popularity("EE402", 2024, "fall", 10),
            ],
            surveys: vec![],
            prior_entries: vec![],
        }
    }

    #[test]
    fn yearly_success_averages_terms_and_ignores_future_years() {
        let input = base_input();
        let yearly = yearly_success(&input.performance, "EE401", 2025);
        assert_eq!(yearly.len(), 2);
        assert_eq!(yearly[1].year, 2024);
        assert!((yearly[1].success_rate - 0.8).abs() < 1e-12);
        let other = yearly_success(&input.performance, "EE402", 2025);
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].success_rate, 0.3);
    }

    #[test]
    fn popularity_sums_latest_year_only() {
        let input = base_input();
        assert_eq!(latest_popularity(&input.popularity, "EE401", 2025), Some(60.0));
        assert_eq!(latest_popularity(&input.popularity, "EE999", 2025), None);
    }

    #[test]
    fn survey_score_averages_forms_of_the_year() {
        let surveys = vec![
            SurveyResult {
                course_id: "EE401".to_string(),
                form_id: 1,
                academic_year: 2025,
                total_score: 10.0,
                vote_count: 4,
                mean_intensity: 4.0,
                normalized_score: 80.0,
            },
            SurveyResult {
                course_id: "EE401".to_string(),
                form_id: 2,
                academic_year: 2025,
                total_score: 5.0,
                vote_count: 2,
                mean_intensity: 3.0,
                normalized_score: 60.0,
            },
            SurveyResult {
                course_id: "EE401".to_string(),
                form_id: 3,
                academic_year: 2024,
                total_score: 1.0,
                vote_count: 1,
                mean_intensity: 1.0,
                normalized_score: 5.0,
            },
        ];
        assert_eq!(survey_score(&surveys, "EE401", 2025), Some(70.0));
        assert_eq!(survey_score(&surveys, "EE401", 2023), None);
    }

    #[test]
    fn mandatory_courses_are_not_part_of_the_pool() {
        let output = DecisionCycle::new(EngineConfig::default())
            .run(&base_input())
            .unwrap();
        assert_eq!(output.entries.len(), 2);
        assert!(output.entry("EE101").is_none());
    }

    #[test]
    fn missing_survey_falls_back_to_default() {
        let output = DecisionCycle::new(EngineConfig::default())
            .run(&base_input())
            .unwrap();
        assert_eq!(output.assessment("EE401").unwrap().survey, 75.0);
        assert!(output.diagnostics.contains(&Diagnostic::MissingSurveyDefault {
            course_id: "EE401".to_string(),
            default: 75.0
        }));
    }

    #[test]
    fn resting_courses_are_carried_forward_unranked() {
        let mut input = base_input();
        input.prior_entries = vec![PoolEntry {
            course_id: "EE402".to_string(),
            academic_year: 2024,
            status: PoolStatus::Resting,
            miss_counter: 2,
            score: 0.12,
        }];
        let output = DecisionCycle::new(EngineConfig::default())
            .run(&input)
            .unwrap();
        assert_eq!(output.ranking.len(), 1);
        let resting = output.entry("EE402").unwrap();
        assert_eq!(resting.status, PoolStatus::Resting);
        assert_eq!(resting.miss_counter, 2);
        assert_eq!(resting.score, 0.12);
        assert_eq!(resting.academic_year, 2025);
    }

    #[test]
    fn dominated_course_loses_its_seat() {
        let mut input = base_input();
        input.prior_entries = vec![
            PoolEntry {
                course_id: "EE401".to_string(),
                academic_year: 2024,
                status: PoolStatus::Selected,
                miss_counter: 0,
                score: 0.8,
            },
            PoolEntry {
                course_id: "EE402".to_string(),
                academic_year: 2024,
                status: PoolStatus::Selected,
                miss_counter: 0,
                score: 0.6,
            },
        ];
        let output = DecisionCycle::new(EngineConfig {
            criteria: CriteriaConfig::three_criteria(),
            ..EngineConfig::default()
        })
        .run(&input)
        .unwrap();

        assert_eq!(output.ranking[0].course_id, "EE401");
        assert!(output.snapshot.contains("EE401"));
        assert!(!output.snapshot.contains("EE402"));

        let dropped = output.entry("EE402").unwrap();
        assert_eq!(dropped.status, PoolStatus::InPool);
        assert_eq!(dropped.miss_counter, 1);
        assert_eq!(
            output.changes,
            vec![StatusChange {
                course_id: "EE402".to_string(),
                previous: Some(PoolStatus::Selected),
                current: PoolStatus::InPool,
                miss_counter: 1,
            }]
        );
    }

    #[test]
    fn bad_matrix_aborts_the_cycle() {
        let config = EngineConfig {
            criteria: CriteriaConfig {
                order: vec![Criterion::Success, Criterion::Survey],
                pairwise: Some(vec![vec![1.0, 2.0], vec![2.0, 1.0]]),
                weights: None,
            },
            ..EngineConfig::default()
        };
        let err = DecisionCycle::new(config).run(&base_input()).unwrap_err();
        assert!(matches!(err, crate::EngineError::InvalidMatrix { .. }));
    }

    #[test]
    fn latest_prior_entry_wins() {
        let entries = vec![
            PoolEntry {
                course_id: "A".to_string(),
                academic_year: 2022,
                status: PoolStatus::Selected,
                miss_counter: 0,
                score: 1.0,
            },
            PoolEntry {
                course_id: "A".to_string(),
                academic_year: 2024,
                status: PoolStatus::InPool,
                miss_counter: 1,
                score: 0.4,
            },
            PoolEntry {
                course_id: "A".to_string(),
                academic_year: 2025,
                status: PoolStatus::Resting,
                miss_counter: 2,
                score: 0.1,
            },
        ];
        let latest = latest_prior_entries(&entries, 2025);
        assert_eq!(latest["A"].academic_year, 2024);
    }
}
