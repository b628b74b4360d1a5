use std::fmt::Write;
use std::io;

use serde::Serialize;

use crate::cycle::CycleOutput;
use crate::models::PoolStatus;

#[derive(Debug, Serialize)]
struct RankingCsvRow<'a> {
    position: usize,
    course_id: &'a str,
    course_name: &'a str,
    closeness: f64,
    distance_to_best: f64,
    distance_to_worst: f64,
    admitted: bool,
}

pub fn write_ranking_csv<W: io::Write>(output: &CycleOutput, writer: W) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for (index, ranked) in output.ranking.iter().enumerate() {
        let course_name = output
            .assessment(&ranked.course_id)
            .map(|assessment| assessment.name.as_str())
            .unwrap_or("");
        csv_writer.serialize(RankingCsvRow {
            position: index + 1,
            course_id: &ranked.course_id,
            course_name,
            closeness: ranked.closeness,
            distance_to_best: ranked.distance_to_best,
            distance_to_worst: ranked.distance_to_worst,
            admitted: output.snapshot.contains(&ranked.course_id),
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn build_report(output: &CycleOutput, limit: usize) -> String {
    let mut report = String::new();

    let _ = writeln!(report, "# Elective Pool Decision Report");
    let _ = writeln!(
        report,
        "Generated for {} ({})",
        output.faculty, output.academic_year
    );
    let _ = writeln!(report);
    let _ = writeln!(report, "## Criterion Weights");
    for weight in &output.weights {
        let _ = writeln!(
            report,
            "- {}: {:.4} ({:.1}%)",
            weight.criterion,
            weight.weight,
            weight.weight * 100.0
        );
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "## Ranking");
    if output.ranking.is_empty() {
        let _ = writeln!(report, "No courses were ranked this cycle.");
    } else {
        if let Some(mean) = output.batch_mean {
            let _ = writeln!(report, "Batch mean closeness {mean:.4}");
            let _ = writeln!(report);
        }
        let _ = writeln!(report, "| # | Course | Closeness | S+ | S- | Admitted |");
        let _ = writeln!(report, "|---|--------|-----------|----|----|----------|");
        for (index, ranked) in output.ranking.iter().take(limit).enumerate() {
            let name = output
                .assessment(&ranked.course_id)
                .map(|assessment| assessment.name.as_str())
                .unwrap_or(ranked.course_id.as_str());
            let _ = writeln!(
                report,
                "| {} | {} ({}) | {:.4} | {:.4} | {:.4} | {} |",
                index + 1,
                name,
                ranked.course_id,
                ranked.closeness,
                ranked.distance_to_best,
                ranked.distance_to_worst,
                if output.snapshot.contains(&ranked.course_id) {
                    "yes"
                } else {
                    "no"
                }
            );
        }
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "## Status Changes");
    if output.changes.is_empty() {
        let _ = writeln!(report, "No status changes this cycle.");
    } else {
        for change in &output.changes {
            let previous = change
                .previous
                .map(PoolStatus::label)
                .unwrap_or("new");
            let _ = writeln!(
                report,
                "- {}: {} -> {} (misses {})",
                change.course_id,
                previous,
                change.current.label(),
                change.miss_counter
            );
        }
    }

    let resting: Vec<_> = output
        .entries
        .iter()
        .filter(|entry| entry.status == PoolStatus::Resting)
        .collect();
    let _ = writeln!(report);
    let _ = writeln!(report, "## Resting Courses");
    if resting.is_empty() {
        let _ = writeln!(report, "No courses are resting.");
    } else {
        for entry in resting {
            let _ = writeln!(
                report,
                "- {} (misses {}, last score {:.4})",
                entry.course_id, entry.miss_counter, entry.score
            );
        }
    }

    if !output.diagnostics.is_empty() {
        let _ = writeln!(report);
        let _ = writeln!(report, "## Data Gaps");
        for diagnostic in &output.diagnostics {
            let _ = writeln!(report, "- {}", diagnostic.describe());
        }
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "## Audit Trail");
    for line in &output.weight_audit {
        let _ = writeln!(report, "    {line}");
    }
    for assessment in output.assessments.iter().take(limit) {
        let _ = writeln!(
            report,
            "- {}: {}",
            assessment.course_id, assessment.trend_explanation
        );
    }

    report
}
