//! Year-over-year pool status machine.
//!
//! | last year            | in curriculum | next status                         | miss counter |
//! |----------------------|---------------|-------------------------------------|--------------|
//! | any                  | yes           | Selected                            | 0            |
//! | Selected / InPool    | no            | Resting if counter + 1 >= 2, else InPool | counter + 1 |
//! | Resting              | no            | Resting                             | unchanged    |
//! | never seen           | no            | InPool                              | 0            |
//!
//! Leaving Resting takes an explicit [`LifecycleManager::readmit`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{PoolEntry, PoolStatus};

/// Consecutive misses that send a course to rest.
pub const REST_AFTER_MISSES: u32 = 2;

/// What the `score` field of a pool entry tracks. One mode per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    /// Latest closeness coefficient.
    #[default]
    Closeness,
    /// Number of years the course was selected.
    SuccessCount,
}

impl ScoreMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "closeness" => Some(ScoreMode::Closeness),
            "success_count" | "success-count" => Some(ScoreMode::SuccessCount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleManager {
    mode: ScoreMode,
}

impl LifecycleManager {
    pub fn new(mode: ScoreMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ScoreMode {
        self.mode
    }

    /// Computes the entry for `academic_year` from last year's entry (if any)
    /// and this year's curriculum membership.
    ///
    /// `closeness` is this cycle's coefficient when the course was ranked; in
    /// closeness mode an unranked course keeps its previous score.
    pub fn advance(
        &self,
        prior: Option<&PoolEntry>,
        course_id: &str,
        academic_year: i32,
        in_curriculum: bool,
        closeness: Option<f64>,
    ) -> PoolEntry {
        let prior_counter = prior.map_or(0, |entry| entry.miss_counter);
        let prior_score = prior.map_or(0.0, |entry| entry.score);

        let (status, miss_counter) = match (prior.map(|entry| entry.status), in_curriculum) {
            (_, true) => (PoolStatus::Selected, 0),
            (Some(PoolStatus::Resting), false) => (PoolStatus::Resting, prior_counter),
            (Some(PoolStatus::Selected | PoolStatus::InPool), false) => {
                let misses = prior_counter + 1;
                if misses >= REST_AFTER_MISSES {
                    (PoolStatus::Resting, misses)
                } else {
                    (PoolStatus::InPool, misses)
                }
            }
            (None, false) => (PoolStatus::InPool, 0),
        };

        let score = match self.mode {
            ScoreMode::Closeness => closeness.unwrap_or(prior_score),
            ScoreMode::SuccessCount if in_curriculum => prior_score + 1.0,
            ScoreMode::SuccessCount => prior_score,
        };

        if prior.is_none() {
            tracing::debug!(course_id, academic_year, "new pool entrant");
        }
        if status == PoolStatus::Resting && prior.map(|entry| entry.status) != Some(PoolStatus::Resting) {
            tracing::info!(course_id, academic_year, miss_counter, "course sent to rest");
        }

        PoolEntry {
            course_id: course_id.to_string(),
            academic_year,
            status,
            miss_counter,
            score,
        }
    }

    /// Manual re-admission of a resting course into the pool.
    pub fn readmit(&self, entry: &PoolEntry) -> EngineResult<PoolEntry> {
        if entry.status != PoolStatus::Resting {
            return Err(EngineError::NotResting {
                course_id: entry.course_id.clone(),
                status: entry.status,
            });
        }
        tracing::info!(
            course_id = %entry.course_id,
            academic_year = entry.academic_year,
            "course re-admitted to pool"
        );
        Ok(PoolEntry {
            status: PoolStatus::InPool,
            miss_counter: 0,
            ..entry.clone()
        })
    }

    /// Replays known curricula year by year, starting from `seed` entries
    /// (the year before the first membership year, may be empty).
    ///
    /// Returns one entry per course per replayed year, ordered by year then course.
    pub fn replay(
        &self,
        course_ids: &BTreeSet<String>,
        seed: &BTreeMap<String, PoolEntry>,
        memberships: &BTreeMap<i32, BTreeSet<String>>,
    ) -> Vec<PoolEntry> {
        let mut current: BTreeMap<String, PoolEntry> = seed.clone();
        let mut history = Vec::with_capacity(course_ids.len() * memberships.len());

        for (year, curriculum) in memberships {
            let mut next = BTreeMap::new();
            for course_id in course_ids {
                let entry = self.advance(
                    current.get(course_id),
                    course_id,
                    *year,
                    curriculum.contains(course_id),
                    None,
                );
                history.push(entry.clone());
                next.insert(course_id.clone(), entry);
            }
            tracing::info!(
                year,
                selected = curriculum.len(),
                courses = course_ids.len(),
                "replayed curriculum year"
            );
            current = next;
        }

        history
    }
}
