use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseType {
    Mandatory,
    Elective,
}

impl CourseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseType::Mandatory => "mandatory",
            CourseType::Elective => "elective",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mandatory" | "required" => Some(CourseType::Mandatory),
            "elective" | "optional" => Some(CourseType::Elective),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,
    pub name: String,
    pub faculty: String,
    pub course_type: CourseType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub course_id: String,
    pub academic_year: i32,
    pub term: String,
    pub success_rate: f64,
    pub mean_grade: Option<f64>,
    pub participant_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityRecord {
    pub course_id: String,
    pub academic_year: i32,
    pub term: String,
    pub preference_count: i64,
    pub preference_ratio: Option<f64>,
}

/// One ranked choice on a survey form. `rank` is 1..=3, `intensity` 1..=5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyBallot {
    pub form_id: i64,
    pub student_key: String,
    pub course_id: String,
    pub rank: i32,
    pub intensity: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResult {
    pub course_id: String,
    pub form_id: i64,
    pub academic_year: i32,
    pub total_score: f64,
    pub vote_count: usize,
    pub mean_intensity: f64,
    /// 0..=100
    pub normalized_score: f64,
}

/// A yearly success-rate observation fed to the trend scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearlyRate {
    pub year: i32,
    pub success_rate: f64,
}

/// Ranking criteria. All of them are benefit criteria: higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Success,
    Trend,
    Popularity,
    Survey,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Success => "success",
            Criterion::Trend => "trend",
            Criterion::Popularity => "popularity",
            Criterion::Survey => "survey",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-course criterion values for one cycle, in the order of the owning table's criteria.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaRow {
    pub course_id: String,
    values: Vec<f64>,
}

impl CriteriaRow {
    pub fn new(
        course_id: impl Into<String>,
        criteria: &[Criterion],
        values: Vec<f64>,
    ) -> EngineResult<Self> {
        let course_id = course_id.into();
        if values.len() != criteria.len() {
            return Err(EngineError::InvalidCriteriaRow {
                course_id,
                reason: format!(
                    "expected {} values ({}), got {}",
                    criteria.len(),
                    criteria
                        .iter()
                        .map(Criterion::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                    values.len()
                ),
            });
        }
        if let Some(position) = values.iter().position(|value| !value.is_finite()) {
            return Err(EngineError::InvalidCriteriaRow {
                course_id,
                reason: format!("{} is not a finite number", criteria[position]),
            });
        }
        Ok(Self { course_id, values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// A batch of criteria rows sharing one criteria list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaTable {
    criteria: Vec<Criterion>,
    rows: Vec<CriteriaRow>,
}

impl CriteriaTable {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self {
            criteria,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, course_id: impl Into<String>, values: Vec<f64>) -> EngineResult<()> {
        let row = CriteriaRow::new(course_id, &self.criteria, values)?;
        self.rows.push(row);
        Ok(())
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn rows(&self) -> &[CriteriaRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Selected,
    InPool,
    Resting,
}

impl PoolStatus {
    /// Storage encoding: Selected = 1, InPool = 0, Resting = -1.
    pub fn to_legacy(self) -> i16 {
        match self {
            PoolStatus::Selected => 1,
            PoolStatus::InPool => 0,
            PoolStatus::Resting => -1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PoolStatus::Selected => "selected",
            PoolStatus::InPool => "in pool",
            PoolStatus::Resting => "resting",
        }
    }
}

impl TryFrom<i16> for PoolStatus {
    type Error = EngineError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PoolStatus::Selected),
            0 => Ok(PoolStatus::InPool),
            -1 => Ok(PoolStatus::Resting),
            other => Err(EngineError::UnknownStatus(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub course_id: String,
    pub academic_year: i32,
    pub status: PoolStatus,
    pub miss_counter: u32,
    pub score: f64,
}

/// Courses with status Selected for one faculty and year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumSnapshot {
    pub faculty: String,
    pub academic_year: i32,
    pub course_ids: BTreeSet<String>,
}

impl CurriculumSnapshot {
    pub fn from_entries(faculty: &str, academic_year: i32, entries: &[PoolEntry]) -> Self {
        let course_ids = entries
            .iter()
            .filter(|entry| entry.academic_year == academic_year)
            .filter(|entry| entry.status == PoolStatus::Selected)
            .map(|entry| entry.course_id.clone())
            .collect();
        Self {
            faculty: faculty.to_string(),
            academic_year,
            course_ids,
        }
    }

    pub fn contains(&self, course_id: &str) -> bool {
        self.course_ids.contains(course_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCourse {
    pub course_id: String,
    pub closeness: f64,
    pub distance_to_best: f64,
    pub distance_to_worst: f64,
}
