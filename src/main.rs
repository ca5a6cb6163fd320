use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod carry_forward;
mod config;
mod db;
mod error;
mod models;
mod plan;
mod reading;
mod registry;
mod report;
mod rollup;
mod service;
mod store;
mod tier;

use crate::models::{parse_weekday, FieldType};
use crate::store::TrackerStore;
use crate::tier::{Scope, Tier, TierThresholds};

#[derive(Parser)]
#[command(name = "effort-tracker")]
#[command(about = "Weekly progress and effort tiers for homeschool learners", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo learner with a plan and this week's reports
    Seed,
    /// Register a learner with the default fields
    AddLearner {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Import daily entries from a CSV file (email,date,slug,value)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the pre-filled daily form as JSON
    Defaults {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the weekly rollup as JSON
    Rollup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Store the result when the week is final
        #[arg(long)]
        record: bool,
    },
    /// Print the zero-filled daily series for plotting
    Chart {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Generate a markdown weekly report
    Report {
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "weekly-report.md")]
        out: PathBuf,
    },
    /// Add a custom task definition
    Define {
        #[arg(long)]
        email: String,
        #[arg(long)]
        label: String,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long, default_value = "text")]
        field_type: FieldType,
    },
    /// Deactivate a task and clear its plan entries
    Deactivate {
        #[arg(long)]
        email: String,
        #[arg(long)]
        slug: String,
    },
    /// Delete a custom task definition
    Remove {
        #[arg(long)]
        email: String,
        #[arg(long)]
        slug: String,
    },
    /// Set (or clear, with an empty value) a weekly plan entry
    Plan {
        #[arg(long)]
        email: String,
        #[arg(long)]
        weekday: String,
        #[arg(long)]
        slug: String,
        #[arg(long, default_value = "")]
        value: String,
    },
    /// Store the tier thresholds
    Thresholds {
        #[arg(long)]
        needs_work_max: f64,
        #[arg(long)]
        good_max: f64,
    },
    /// Store the message shown for a scope and tier
    Message {
        #[arg(long)]
        scope: Scope,
        #[arg(long)]
        tier: Tier,
        #[arg(long)]
        text: String,
    },
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| EnvFilter::try_new(raw.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = config::Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = db::PgStore::new(pool.clone());
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let learner = db::seed(&store, today).await?;
            tracing::info!(%learner, "seed data inserted");
            println!("Seed data inserted.");
        }
        Commands::AddLearner { name, email } => {
            let id = store.add_learner(&name, &email).await?;
            println!("Learner {name} <{email}> ready ({id}).");
        }
        Commands::Import { csv } => {
            let written = db::import_csv(&store, &csv).await?;
            println!("Merged {written} daily reports from {}.", csv.display());
        }
        Commands::Defaults { email, date } => {
            let learner = store.learner_by_email(&email).await?;
            let values =
                service::compute_daily_defaults(&store, learner.id, date.unwrap_or(today)).await?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Commands::Rollup {
            email,
            date,
            record,
        } => {
            let date = date.unwrap_or(today);
            let learner = store.learner_by_email(&email).await?;
            let rollup = service::compute_weekly_rollup(&store, learner.id, date).await?;
            println!("{}", serde_json::to_string_pretty(&rollup)?);

            if record
                && service::record_weekly_result(&store, learner.id, &rollup)
                    .await?
                    .is_none()
            {
                eprintln!("Week is still in progress; nothing recorded.");
            }
        }
        Commands::Chart { email, date } => {
            let learner = store.learner_by_email(&email).await?;
            let rollup =
                service::compute_weekly_rollup(&store, learner.id, date.unwrap_or(today)).await?;
            let points: Vec<_> = rollup.daily_data.iter().map(|day| day.chart_point()).collect();
            println!("{}", serde_json::to_string_pretty(&points)?);
        }
        Commands::Report { email, date, out } => {
            let date = date.unwrap_or(today);
            let learner = store.learner_by_email(&email).await?;
            let rollup = service::compute_weekly_rollup(&store, learner.id, date).await?;
            let messages = store.tier_messages().await?;
            let report = report::build_report(&learner, date, &rollup, &messages);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Define {
            email,
            label,
            slug,
            field_type,
        } => {
            let learner = store.learner_by_email(&email).await?;
            let added =
                service::define_task(&store, learner.id, &label, slug.as_deref(), field_type)
                    .await?;
            println!("Defined `{}` ({}).", added.slug, added.field_type.as_str());
        }
        Commands::Deactivate { email, slug } => {
            let learner = store.learner_by_email(&email).await?;
            service::deactivate_task(&store, learner.id, &slug).await?;
            println!("Deactivated `{slug}`.");
        }
        Commands::Remove { email, slug } => {
            let learner = store.learner_by_email(&email).await?;
            let removed = service::remove_task(&store, learner.id, &slug).await?;
            println!("Removed `{}` ({}).", removed.slug, removed.label);
        }
        Commands::Plan {
            email,
            weekday,
            slug,
            value,
        } => {
            let day = parse_weekday(&weekday)
                .ok_or_else(|| error::PlanError::UnknownWeekday(weekday.clone()))?;
            let learner = store.learner_by_email(&email).await?;
            service::set_plan_entry(&store, learner.id, day, &slug, &value).await?;
            println!("Plan updated for {weekday}.");
        }
        Commands::Thresholds {
            needs_work_max,
            good_max,
        } => {
            let thresholds = TierThresholds::new(needs_work_max, good_max)?;
            store.save_tier_thresholds(&thresholds).await?;
            println!(
                "Thresholds set: needsWork below {}, good below {}.",
                thresholds.needs_work_max(),
                thresholds.good_max()
            );
        }
        Commands::Message { scope, tier, text } => {
            store.save_tier_message(scope, tier, &text).await?;
            println!("Message stored for {scope}/{tier}.");
        }
    }

    Ok(())
}
