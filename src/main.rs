use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod db;
mod engine;
mod merge;
mod models;
mod reduce;
mod report;
mod schedule;
mod sequence;

use crate::schedule::{load_schedule_file, PeriodScheme, SchemeKind, TermSchedule};

#[derive(Parser)]
#[command(name = "classroom-averages")]
#[command(about = "Weighted term averages for classroom grade books", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ScheduleArgs {
    /// Ordered weights as a query string, e.g. bimestre_1=0.7&sumativa_1=0.3
    #[arg(long, group = "schedule_source")]
    weights: Option<String>,
    /// One term=weight pair; repeat in schedule order
    #[arg(long = "term-weight", group = "schedule_source")]
    term_weights: Vec<String>,
    /// TOML file with [[terms]] entries
    #[arg(long, group = "schedule_source")]
    schedule: Option<PathBuf>,
    /// Period scheme; inferred from the schedule length when omitted
    #[arg(long, value_enum)]
    scheme: Option<SchemeKind>,
}

impl ScheduleArgs {
    fn resolve(&self) -> anyhow::Result<(TermSchedule, PeriodScheme)> {
        let (schedule, file_scheme) = if let Some(query) = &self.weights {
            (TermSchedule::parse_query(query)?, None)
        } else if let Some(path) = &self.schedule {
            load_schedule_file(path)?
        } else if !self.term_weights.is_empty() {
            (TermSchedule::from_pairs(self.term_weights.as_slice())?, None)
        } else {
            bail!("one of --weights, --term-weight or --schedule is required");
        };

        if schedule.is_empty() {
            bail!("the schedule has no terms");
        }

        let scheme = self
            .scheme
            .map(PeriodScheme::from_kind)
            .or(file_scheme)
            .unwrap_or_else(|| PeriodScheme::for_schedule(&schedule));

        Ok((schedule, scheme))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import grades from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Plain per-term averages of regular grades
    Averages {
        #[arg(long)]
        classroom: i64,
        #[arg(long)]
        pretty: bool,
    },
    /// Weighted averages with partial and final averages as JSON
    Weighted {
        #[arg(long)]
        classroom: i64,
        /// Only use grades recorded for this term
        #[arg(long)]
        term: Option<String>,
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[arg(long)]
        pretty: bool,
    },
    /// Generate a markdown report of weighted averages
    Report {
        #[arg(long)]
        classroom: i64,
        #[arg(long)]
        term: Option<String>,
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[arg(long, default_value = "averages.md")]
        out: PathBuf,
    },
    /// Compute weighted averages from a CSV file without a database
    Compute {
        #[arg(long)]
        csv: PathBuf,
        /// Only use rows for this classroom
        #[arg(long)]
        classroom: Option<i64>,
        #[arg(long)]
        term: Option<String>,
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[arg(long)]
        pretty: bool,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_json<T: serde::Serialize>(averages: &T, pretty: bool) -> anyhow::Result<()> {
    let body = serde_json::json!({ "averages": averages });
    let text = if pretty {
        serde_json::to_string_pretty(&body)?
    } else {
        serde_json::to_string(&body)?
    };
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            info!("schema ready");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            info!("seed data inserted");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            info!(inserted, path = %csv.display(), "imported grades");
        }
        Commands::Averages { classroom, pretty } => {
            let pool = connect().await?;
            let rows = db::fetch_grade_rows(&pool, classroom, None).await?;
            print_json(&engine::term_averages(&rows), pretty)?;
        }
        Commands::Weighted {
            classroom,
            term,
            schedule,
            pretty,
        } => {
            let (schedule, scheme) = schedule.resolve()?;
            let pool = connect().await?;
            let rows = db::fetch_grade_rows(&pool, classroom, term.as_deref()).await?;
            let reports = engine::build_reports(&rows, &schedule, &scheme);
            info!(classroom, reports = reports.len(), "computed weighted averages");
            print_json(&reports, pretty)?;
        }
        Commands::Report {
            classroom,
            term,
            schedule,
            out,
        } => {
            let (schedule, scheme) = schedule.resolve()?;
            let pool = connect().await?;
            let rows = db::fetch_grade_rows(&pool, classroom, term.as_deref()).await?;
            let reports = engine::build_reports(&rows, &schedule, &scheme);
            let report = report::build_report(
                classroom,
                term.as_deref(),
                chrono::Utc::now().date_naive(),
                &schedule,
                &reports,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), "report written");
        }
        Commands::Compute {
            csv,
            classroom,
            term,
            schedule,
            pretty,
        } => {
            let (schedule, scheme) = schedule.resolve()?;
            let rows = db::filter_records(db::read_grade_csv(&csv)?, classroom, term.as_deref());
            let reports = engine::build_reports(&rows, &schedule, &scheme);
            info!(rows = rows.len(), reports = reports.len(), "computed weighted averages");
            print_json(&reports, pretty)?;
        }
    }

    Ok(())
}
