use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::cycle::CycleInput;
use crate::models::{
    Course, CourseType, CurriculumSnapshot, PerformanceRecord, PoolEntry, PoolStatus,
    PopularityRecord, SurveyBallot, SurveyResult,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let faculty = "Engineering";
    let courses = vec![
        ("EE301", "Power Electronics I", "elective"),
        ("EE302", "Digital Signal Processing", "elective"),
        ("EE303", "Embedded Systems II", "elective"),
        ("EE304", "Renewable Energy Sources", "elective"),
        ("EE305", "Antennas and Propagation", "elective"),
        ("EE306", "Nanoelectronics", "elective"),
        ("EE101", "Circuit Analysis", "mandatory"),
    ];

    for (course_id, name, course_type) in &courses {
        sqlx::query(
            r#"
            INSERT INTO elective_pool.courses (course_id, name, faculty, course_type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (course_id) DO UPDATE
            SET name = EXCLUDED.name, faculty = EXCLUDED.faculty, course_type = EXCLUDED.course_type
            "#,
        )
        .bind(course_id)
        .bind(name)
        .bind(faculty)
        .bind(course_type)
        .execute(pool)
        .await?;
    }

    let success_history = vec![
        ("EE301", [0.78, 0.81, 0.86]),
        ("EE302", [0.64, 0.59, 0.55]),
        ("EE303", [0.71, 0.74, 0.70]),
        ("EE304", [0.88, 0.90, 0.92]),
        ("EE305", [0.42, 0.38, 0.35]),
        ("EE306", [0.50, 0.57, 0.66]),
    ];

    for (course_id, rates) in &success_history {
        for (year, rate) in (2022..=2024).zip(rates.iter()) {
            for (term, offset) in [("fall", 0.02_f64), ("spring", -0.02)] {
                sqlx::query(
                    r#"
                    INSERT INTO elective_pool.performance_records
                    (course_id, academic_year, term, success_rate, mean_grade, participant_count)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (course_id, academic_year, term) DO NOTHING
                    "#,
                )
                .bind(course_id)
                .bind(year)
                .bind(term)
                .bind((rate + offset).clamp(0.0, 1.0))
                .bind(Some(50.0 + rate * 40.0))
                .bind(Some(35_i32))
                .execute(pool)
                .await?;
            }
        }
    }

    let preferences = vec![
        ("EE301", 84_i64),
        ("EE302", 41),
        ("EE303", 66),
        ("EE304", 120),
        ("EE305", 18),
        ("EE306", 57),
    ];
    for (course_id, count) in &preferences {
        sqlx::query(
            r#"
            INSERT INTO elective_pool.popularity_records
            (course_id, academic_year, term, preference_count, preference_ratio)
            VALUES ($1, 2024, 'fall', $2, NULL)
            ON CONFLICT (course_id, academic_year, term) DO NOTHING
            "#,
        )
        .bind(course_id)
        .bind(count)
        .execute(pool)
        .await?;
    }

    let curricula = vec![
        (2022, vec!["EE301", "EE302", "EE305"]),
        (2023, vec!["EE301", "EE303", "EE304"]),
        (2024, vec!["EE301", "EE304", "EE306"]),
    ];
    for (year, course_ids) in &curricula {
        for course_id in course_ids {
            sqlx::query(
                r#"
                INSERT INTO elective_pool.historical_curricula (faculty, academic_year, course_id)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(faculty)
            .bind(year)
            .bind(course_id)
            .execute(pool)
            .await?;
        }
    }

    sqlx::query(
        r#"
        INSERT INTO elective_pool.survey_forms (form_id, faculty, academic_year, term, active)
        VALUES (1, $1, 2025, 'fall', TRUE)
        ON CONFLICT (form_id) DO NOTHING
        "#,
    )
    .bind(faculty)
    .execute(pool)
    .await?;

    let ballots = vec![
        ("student-001", "EE304", 1, Some(5)),
        ("student-001", "EE301", 2, Some(4)),
        ("student-001", "EE306", 3, Some(3)),
        ("student-002", "EE301", 1, Some(4)),
        ("student-002", "EE303", 2, None),
        ("student-002", "EE304", 3, Some(2)),
        ("student-003", "EE306", 1, Some(5)),
        ("student-003", "EE304", 2, Some(5)),
        ("student-003", "EE302", 3, Some(1)),
    ];
    for (student_key, course_id, rank, intensity) in ballots {
        sqlx::query(
            r#"
            INSERT INTO elective_pool.survey_ballots
            (id, form_id, student_key, course_id, rank, intensity)
            VALUES ($1, 1, $2, $3, $4, $5)
            ON CONFLICT (form_id, student_key, rank) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_key)
        .bind(course_id)
        .bind(rank)
        .bind(intensity)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_performance_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        course_id: String,
        course_name: String,
        faculty: String,
        course_type: String,
        academic_year: i32,
        term: String,
        success_rate: f64,
        mean_grade: Option<f64>,
        participant_count: Option<i32>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let course_type = CourseType::parse(&row.course_type)
            .with_context(|| format!("row {}: unknown course type {}", line + 1, row.course_type))?;
        if !(0.0..=1.0).contains(&row.success_rate) {
            anyhow::bail!(
                "row {}: success rate {} is outside 0..=1",
                line + 1,
                row.success_rate
            );
        }

        sqlx::query(
            r#"
            INSERT INTO elective_pool.courses (course_id, name, faculty, course_type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (course_id) DO UPDATE
            SET name = EXCLUDED.name, faculty = EXCLUDED.faculty, course_type = EXCLUDED.course_type
            "#,
        )
        .bind(&row.course_id)
        .bind(&row.course_name)
        .bind(&row.faculty)
        .bind(course_type.as_str())
        .execute(pool)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO elective_pool.performance_records
            (course_id, academic_year, term, success_rate, mean_grade, participant_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (course_id, academic_year, term) DO NOTHING
            "#,
        )
        .bind(&row.course_id)
        .bind(row.academic_year)
        .bind(&row.term)
        .bind(row.success_rate)
        .bind(row.mean_grade)
        .bind(row.participant_count)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            imported += 1;
        }
    }

    Ok(imported)
}

pub async fn fetch_faculty_courses(pool: &PgPool, faculty: &str) -> anyhow::Result<Vec<Course>> {
    let rows = sqlx::query(
        "SELECT course_id, name, faculty, course_type \
         FROM elective_pool.courses \
         WHERE faculty = $1 \
         ORDER BY course_id",
    )
    .bind(faculty)
    .fetch_all(pool)
    .await?;

    let mut courses = Vec::with_capacity(rows.len());
    for row in rows {
        let course_type: String = row.get("course_type");
        courses.push(Course {
            course_id: row.get("course_id"),
            name: row.get("name"),
            faculty: row.get("faculty"),
            course_type: CourseType::parse(&course_type)
                .with_context(|| format!("unknown course type {course_type}"))?,
        });
    }
    Ok(courses)
}

/// Reads everything a decision cycle needs, before any computation starts.
pub async fn fetch_cycle_input(
    pool: &PgPool,
    faculty: &str,
    academic_year: i32,
) -> anyhow::Result<CycleInput> {
    let courses = fetch_faculty_courses(pool, faculty).await?;

    let performance = sqlx::query(
        "SELECT p.course_id, p.academic_year, p.term, p.success_rate, p.mean_grade, p.participant_count \
         FROM elective_pool.performance_records p \
         JOIN elective_pool.courses c ON c.course_id = p.course_id \
         WHERE c.faculty = $1 AND p.academic_year < $2 \
         ORDER BY p.course_id, p.academic_year, p.term",
    )
    .bind(faculty)
    .bind(academic_year)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| PerformanceRecord {
        course_id: row.get("course_id"),
        academic_year: row.get("academic_year"),
        term: row.get("term"),
        success_rate: row.get("success_rate"),
        mean_grade: row.get("mean_grade"),
        participant_count: row.get("participant_count"),
    })
    .collect();

    let popularity = sqlx::query(
        "SELECT p.course_id, p.academic_year, p.term, p.preference_count, p.preference_ratio \
         FROM elective_pool.popularity_records p \
         JOIN elective_pool.courses c ON c.course_id = p.course_id \
         WHERE c.faculty = $1 AND p.academic_year < $2 \
         ORDER BY p.course_id, p.academic_year, p.term",
    )
    .bind(faculty)
    .bind(academic_year)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| PopularityRecord {
        course_id: row.get("course_id"),
        academic_year: row.get("academic_year"),
        term: row.get("term"),
        preference_count: row.get("preference_count"),
        preference_ratio: row.get("preference_ratio"),
    })
    .collect();

    let mut surveys = Vec::new();
    for row in sqlx::query(
        "SELECT s.course_id, s.form_id, s.academic_year, s.total_score, s.vote_count, \
         s.mean_intensity, s.normalized_score \
         FROM elective_pool.survey_results s \
         JOIN elective_pool.courses c ON c.course_id = s.course_id \
         WHERE c.faculty = $1 AND s.academic_year = $2 \
         ORDER BY s.course_id, s.form_id",
    )
    .bind(faculty)
    .bind(academic_year)
    .fetch_all(pool)
    .await?
    {
        let vote_count: i32 = row.get("vote_count");
        surveys.push(SurveyResult {
            course_id: row.get("course_id"),
            form_id: row.get("form_id"),
            academic_year: row.get("academic_year"),
            total_score: row.get("total_score"),
            vote_count: usize::try_from(vote_count).context("negative vote count")?,
            mean_intensity: row.get("mean_intensity"),
            normalized_score: row.get("normalized_score"),
        });
    }

    let prior_rows = sqlx::query(
        "SELECT DISTINCT ON (e.course_id) e.course_id, e.academic_year, e.status, e.miss_counter, e.score \
         FROM elective_pool.pool_entries e \
         JOIN elective_pool.courses c ON c.course_id = e.course_id \
         WHERE c.faculty = $1 AND e.academic_year < $2 \
         ORDER BY e.course_id, e.academic_year DESC",
    )
    .bind(faculty)
    .bind(academic_year)
    .fetch_all(pool)
    .await?;
    let prior_entries = prior_rows
        .iter()
        .map(pool_entry_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CycleInput {
        faculty: faculty.to_string(),
        academic_year,
        courses,
        performance,
        popularity,
        surveys,
        prior_entries,
    })
}

/// Returns the form's academic year and its ballots.
pub async fn fetch_ballots(
    pool: &PgPool,
    form_id: i64,
) -> anyhow::Result<(i32, Vec<SurveyBallot>)> {
    let academic_year: i32 = sqlx::query(
        "SELECT academic_year FROM elective_pool.survey_forms WHERE form_id = $1",
    )
    .bind(form_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("survey form {form_id} does not exist"))?
    .get("academic_year");

    let ballots = sqlx::query(
        "SELECT form_id, student_key, course_id, rank, intensity \
         FROM elective_pool.survey_ballots \
         WHERE form_id = $1 \
         ORDER BY student_key, rank",
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| SurveyBallot {
        form_id: row.get("form_id"),
        student_key: row.get("student_key"),
        course_id: row.get("course_id"),
        rank: row.get("rank"),
        intensity: row.get("intensity"),
    })
    .collect();

    Ok((academic_year, ballots))
}

pub async fn store_survey_results(
    pool: &PgPool,
    results: &[SurveyResult],
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    for result in results {
        sqlx::query(
            r#"
            INSERT INTO elective_pool.survey_results
            (course_id, form_id, academic_year, total_score, vote_count, mean_intensity,
             normalized_score, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (course_id, form_id) DO UPDATE
            SET total_score = EXCLUDED.total_score,
                vote_count = EXCLUDED.vote_count,
                mean_intensity = EXCLUDED.mean_intensity,
                normalized_score = EXCLUDED.normalized_score,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(&result.course_id)
        .bind(result.form_id)
        .bind(result.academic_year)
        .bind(result.total_score)
        .bind(i32::try_from(result.vote_count).context("vote count overflow")?)
        .bind(result.mean_intensity)
        .bind(result.normalized_score)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(results.len())
}

/// Upserts pool entries in one transaction. Re-running with the same entries
/// leaves the table unchanged apart from `updated_at`.
pub async fn write_pool_entries(pool: &PgPool, entries: &[PoolEntry]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let updated_at = Utc::now();
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO elective_pool.pool_entries
            (id, course_id, academic_year, status, miss_counter, score, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (course_id, academic_year) DO UPDATE
            SET status = EXCLUDED.status,
                miss_counter = EXCLUDED.miss_counter,
                score = EXCLUDED.score,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.course_id)
        .bind(entry.academic_year)
        .bind(entry.status.to_legacy())
        .bind(i32::try_from(entry.miss_counter).context("miss counter overflow")?)
        .bind(entry.score)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(entries.len())
}

pub async fn fetch_pool_entry(
    pool: &PgPool,
    course_id: &str,
    academic_year: i32,
) -> anyhow::Result<Option<PoolEntry>> {
    let row = sqlx::query(
        "SELECT course_id, academic_year, status, miss_counter, score \
         FROM elective_pool.pool_entries \
         WHERE course_id = $1 AND academic_year = $2",
    )
    .bind(course_id)
    .bind(academic_year)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(pool_entry_from_row).transpose()
}

pub async fn fetch_pool_entries(
    pool: &PgPool,
    faculty: &str,
    academic_year: i32,
) -> anyhow::Result<Vec<PoolEntry>> {
    let rows = sqlx::query(
        "SELECT e.course_id, e.academic_year, e.status, e.miss_counter, e.score \
         FROM elective_pool.pool_entries e \
         JOIN elective_pool.courses c ON c.course_id = e.course_id \
         WHERE c.faculty = $1 AND e.academic_year = $2 \
         ORDER BY e.course_id",
    )
    .bind(faculty)
    .bind(academic_year)
    .fetch_all(pool)
    .await?;

    rows.iter().map(pool_entry_from_row).collect()
}

pub async fn fetch_snapshot(
    pool: &PgPool,
    faculty: &str,
    academic_year: i32,
) -> anyhow::Result<CurriculumSnapshot> {
    let entries = fetch_pool_entries(pool, faculty, academic_year).await?;
    Ok(CurriculumSnapshot::from_entries(
        faculty,
        academic_year,
        &entries,
    ))
}

pub async fn fetch_historical_curricula(
    pool: &PgPool,
    faculty: &str,
    from_year: i32,
    to_year: i32,
) -> anyhow::Result<BTreeMap<i32, BTreeSet<String>>> {
    let rows = sqlx::query(
        "SELECT academic_year, course_id \
         FROM elective_pool.historical_curricula \
         WHERE faculty = $1 AND academic_year BETWEEN $2 AND $3",
    )
    .bind(faculty)
    .bind(from_year)
    .bind(to_year)
    .fetch_all(pool)
    .await?;

    let mut curricula: BTreeMap<i32, BTreeSet<String>> =
        (from_year..=to_year).map(|year| (year, BTreeSet::new())).collect();
    for row in rows {
        let year: i32 = row.get("academic_year");
        curricula
            .entry(year)
            .or_default()
            .insert(row.get("course_id"));
    }
    Ok(curricula)
}

fn pool_entry_from_row(row: &PgRow) -> anyhow::Result<PoolEntry> {
    let status: i16 = row.get("status");
    let miss_counter: i32 = row.get("miss_counter");
    Ok(PoolEntry {
        course_id: row.get("course_id"),
        academic_year: row.get("academic_year"),
        status: PoolStatus::try_from(status)?,
        miss_counter: u32::try_from(miss_counter).context("negative miss counter")?,
        score: row.get("score"),
    })
}
