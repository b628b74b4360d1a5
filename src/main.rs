use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use elective_pool_engine::lifecycle::LifecycleManager;
use elective_pool_engine::models::{CourseType, PoolStatus};
use elective_pool_engine::{db, report, survey, CycleInput, DecisionCycle, EngineConfig};

#[derive(Parser)]
#[command(name = "elective-pool")]
#[command(about = "Elective course pool ranking and lifecycle tracker", long_about = None)]
struct Cli {
    /// TOML file with criteria, thresholds and defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import per-term performance records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Aggregate the ballots of one survey form into survey results
    AggregateSurvey {
        #[arg(long)]
        form: i64,
    },
    /// Rank a faculty's electives for a year without writing anything
    Rank {
        #[arg(long)]
        faculty: String,
        #[arg(long)]
        year: i32,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Run the decision cycle and persist the new pool entries
    Run {
        #[arg(long)]
        faculty: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a markdown committee report
    Report {
        #[arg(long)]
        faculty: String,
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Also export the ranking as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Show the curriculum stored for a year
    Snapshot {
        #[arg(long)]
        faculty: String,
        #[arg(long)]
        year: i32,
    },
    /// Move a resting course back into the pool
    Readmit {
        #[arg(long)]
        course: String,
        #[arg(long)]
        year: i32,
    },
    /// Rebuild pool entries from historical curricula
    Backfill {
        #[arg(long)]
        faculty: String,
        #[arg(long)]
        from: i32,
        #[arg(long)]
        to: i32,
    },
    /// Run a cycle from a JSON input file, no database needed
    Evaluate {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("CURRICULUM_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    if let Commands::Evaluate { input, out } = &cli.command {
        let raw = std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let cycle_input: CycleInput = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid cycle input", input.display()))?;
        let output = DecisionCycle::new(config).run(&cycle_input)?;
        let json = serde_json::to_string_pretty(&output)?;
        match out {
            Some(path) => {
                std::fs::write(path, json)?;
                println!("Cycle output written to {}.", path.display());
            }
            None => println!("{json}"),
        }
        return Ok(());
    }

    let pool = connect().await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_performance_csv(&pool, &csv).await?;
            println!(
                "Inserted {inserted} performance records from {}.",
                csv.display()
            );
        }
        Commands::AggregateSurvey { form } => {
            let (academic_year, ballots) = db::fetch_ballots(&pool, form).await?;
            let results = survey::aggregate(&ballots, academic_year);
            let stored = db::store_survey_results(&pool, &results).await?;
            println!(
                "Aggregated {} ballots into {stored} course results for form {form}.",
                ballots.len()
            );
        }
        Commands::Rank {
            faculty,
            year,
            limit,
        } => {
            let input = db::fetch_cycle_input(&pool, &faculty, year).await?;
            let output = DecisionCycle::new(config).run(&input)?;

            if output.ranking.is_empty() {
                println!("No electives to rank for {faculty} in {year}.");
                return Ok(());
            }

            println!("Top electives by closeness:");
            for ranked in output.ranking.iter().take(limit) {
                let admitted = if output.snapshot.contains(&ranked.course_id) {
                    "admitted"
                } else {
                    "not admitted"
                };
                println!(
                    "- {} closeness {:.4} (S+ {:.4}, S- {:.4}) {admitted}",
                    ranked.course_id,
                    ranked.closeness,
                    ranked.distance_to_best,
                    ranked.distance_to_worst
                );
            }
        }
        Commands::Run {
            faculty,
            year,
            dry_run,
        } => {
            let input = db::fetch_cycle_input(&pool, &faculty, year).await?;
            let output = DecisionCycle::new(config).run(&input)?;

            for change in &output.changes {
                println!(
                    "- {}: {} -> {}",
                    change.course_id,
                    change.previous.map(PoolStatus::label).unwrap_or("new"),
                    change.current.label()
                );
            }
            if dry_run {
                println!(
                    "Dry run: {} entries computed, nothing written.",
                    output.entries.len()
                );
            } else {
                let written = db::write_pool_entries(&pool, &output.entries).await?;
                println!(
                    "Wrote {written} pool entries, {} courses selected for {year}.",
                    output.snapshot.course_ids.len()
                );
            }
        }
        Commands::Report {
            faculty,
            year,
            out,
            csv,
            limit,
        } => {
            let input = db::fetch_cycle_input(&pool, &faculty, year).await?;
            let output = DecisionCycle::new(config).run(&input)?;
            let report = report::build_report(&output, limit);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());

            if let Some(csv_path) = csv {
                let file = std::fs::File::create(&csv_path)
                    .with_context(|| format!("failed to create {}", csv_path.display()))?;
                report::write_ranking_csv(&output, file)?;
                println!("Ranking exported to {}.", csv_path.display());
            }
        }
        Commands::Snapshot { faculty, year } => {
            let snapshot = db::fetch_snapshot(&pool, &faculty, year).await?;
            if snapshot.course_ids.is_empty() {
                println!("No courses selected for {faculty} in {year}.");
            } else {
                println!("Curriculum for {faculty} ({year}):");
                for course_id in &snapshot.course_ids {
                    println!("- {course_id}");
                }
            }
        }
        Commands::Readmit { course, year } => {
            let entry = db::fetch_pool_entry(&pool, &course, year)
                .await?
                .with_context(|| format!("no pool entry for {course} in {year}"))?;
            let manager = LifecycleManager::new(config.lifecycle.score_mode);
            let readmitted = manager.readmit(&entry)?;
            db::write_pool_entries(&pool, std::slice::from_ref(&readmitted)).await?;
            println!("{course} is back in the pool for {year}.");
        }
        Commands::Backfill { faculty, from, to } => {
            if from > to {
                anyhow::bail!("--from {from} is after --to {to}");
            }
            backfill(&pool, &config, &faculty, from, to).await?;
        }
        Commands::Evaluate { .. } => {}
    }

    Ok(())
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn backfill(
    pool: &PgPool,
    config: &EngineConfig,
    faculty: &str,
    from: i32,
    to: i32,
) -> anyhow::Result<()> {
    let course_ids: BTreeSet<String> = db::fetch_faculty_courses(pool, faculty)
        .await?
        .into_iter()
        .filter(|course| course.course_type == CourseType::Elective)
        .map(|course| course.course_id)
        .collect();
    let seed: BTreeMap<String, _> = db::fetch_pool_entries(pool, faculty, from - 1)
        .await?
        .into_iter()
        .map(|entry| (entry.course_id.clone(), entry))
        .collect();
    let memberships = db::fetch_historical_curricula(pool, faculty, from, to).await?;

    let manager = LifecycleManager::new(config.lifecycle.score_mode);
    let entries = manager.replay(&course_ids, &seed, &memberships);
    let written = db::write_pool_entries(pool, &entries).await?;

    println!(
        "Backfilled {written} pool entries for {} electives across {from}..={to}.",
        course_ids.len()
    );
    Ok(())
}
