use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod db;
mod models;
mod narrative;
mod report;
mod risk;
mod streak;

use config::RiskConfig;
use models::MoodTag;
use narrative::Narrator;

#[derive(Parser)]
#[command(name = "classmood-wellbeing")]
#[command(about = "Emotional-wellbeing tracker core: check-in streaks and class risk analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import emotion records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a student's daily emotion check-in
    Submit {
        #[arg(long)]
        student: String,
        #[arg(long)]
        mood: MoodTag,
        #[arg(long)]
        message: Option<String>,
        /// Emit the response envelope as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show a student's streak and achieved milestones
    Streak {
        #[arg(long)]
        student: String,
    },
    /// Analyze class sentiment and surface students needing attention
    Analyze {
        #[arg(long)]
        class: String,
        #[arg(long, default_value_t = 7)]
        window_days: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Ask the configured text-generation service for a narrative
        #[arg(long, default_value_t = false)]
        narrative: bool,
        #[arg(long)]
        risk_config: Option<PathBuf>,
    },
    /// Generate a markdown wellbeing report
    Report {
        #[arg(long)]
        class: String,
        #[arg(long, default_value_t = 7)]
        window_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        risk_config: Option<PathBuf>,
    },
}

fn load_risk_config(path: Option<&PathBuf>) -> anyhow::Result<RiskConfig> {
    match path {
        Some(path) => RiskConfig::from_file(path),
        None => match std::env::var("CLASSMOOD_RISK_CONFIG") {
            Ok(path) => RiskConfig::from_file(std::path::Path::new(&path)),
            Err(_) => Ok(RiskConfig::default()),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    // Built once here and injected below; a missing API key yields the
    // disabled variant instead of runtime environment checks.
    let narrator = Narrator::from_env()?;

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
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} emotion records from {}.", csv.display());
        }
        Commands::Submit {
            student,
            mood,
            message,
            json,
        } => {
            let record = db::fetch_student_by_code(&pool, &student)
                .await?
                .with_context(|| format!("no student with code {student}"))?;
            let message = message.unwrap_or_default();

            let outcome =
                streak::record_submission(&pool, &record, mood, &message, Utc::now()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "{} checked in as {mood}. Streak {} day(s) (best {}), {} check-ins total, +{} points.",
                    record.name,
                    outcome.streak.current_streak,
                    outcome.streak.longest_streak,
                    outcome.streak.total_submissions,
                    outcome.points_awarded
                );
                if let Some(milestone) = &outcome.milestone_achieved {
                    println!(
                        "Milestone reached: {} {} ({} days, +{} points)",
                        milestone.icon, milestone.name, milestone.day_count, milestone.reward_points
                    );
                }
            }
        }
        Commands::Streak { student } => {
            let record = db::fetch_student_by_code(&pool, &student)
                .await?
                .with_context(|| format!("no student with code {student}"))?;

            match db::fetch_streak(&pool, record.id).await? {
                None => println!("{} has not checked in yet.", record.name),
                Some(state) => {
                    println!(
                        "{}: streak {} day(s), best {}, {} check-ins, last on {}.",
                        record.name,
                        state.current_streak,
                        state.longest_streak,
                        state.total_submissions,
                        state
                            .last_submission_day
                            .map(|day| day.to_string())
                            .unwrap_or_else(|| "never".to_string())
                    );
                    let achievements = db::fetch_achievements(&pool, record.id).await?;
                    if achievements.is_empty() {
                        println!("No milestones achieved yet.");
                    } else {
                        println!("Milestones:");
                        for achieved in achievements {
                            println!(
                                "- {} {} ({} days) on {}",
                                achieved.icon,
                                achieved.name,
                                achieved.day_count,
                                achieved.achieved_at.date_naive()
                            );
                        }
                    }
                }
            }
        }
        Commands::Analyze {
            class,
            window_days,
            limit,
            narrative,
            risk_config,
        } => {
            let config = load_risk_config(risk_config.as_ref())?;
            let students = db::fetch_class_students(&pool, &class).await?;
            if students.is_empty() {
                println!("No students found in class {class}.");
                return Ok(());
            }

            let since = aggregate::window_start(window_days, Utc::now());
            let records = db::fetch_window_records(&pool, &class, since).await?;
            let analysis = aggregate::analyze_class(&class, window_days, &students, &records, &config);

            println!(
                "Class {class}, last {window_days} day(s): {} check-ins.",
                analysis.total_submissions
            );
            for mood in MoodTag::ALL {
                println!(
                    "- {mood}: {} ({:.1}%)",
                    analysis.emotion_counts.count(mood),
                    analysis.emotion_counts.share(mood)
                );
            }

            if analysis.concerning.is_empty() {
                println!("No students need special attention.");
            } else {
                println!("Students needing attention:");
                for assessment in analysis.concerning.iter().take(limit) {
                    println!(
                        "- {} [{}] score {:.0}: {:.1}% negative, {} consecutive negative day(s){}",
                        assessment.name,
                        assessment.risk_level.as_str(),
                        assessment.risk_score,
                        assessment.negative_ratio,
                        assessment.consecutive_negative_days,
                        if assessment.has_dangerous_keywords {
                            ", danger keywords in messages"
                        } else {
                            ""
                        }
                    );
                }
            }

            if narrative {
                println!();
                println!("{}", narrator.narrate(&analysis).await);
            }
        }
        Commands::Report {
            class,
            window_days,
            out,
            risk_config,
        } => {
            let config = load_risk_config(risk_config.as_ref())?;
            let students = db::fetch_class_students(&pool, &class).await?;
            let since = aggregate::window_start(window_days, Utc::now());
            let records = db::fetch_window_records(&pool, &class, since).await?;
            let analysis = aggregate::analyze_class(&class, window_days, &students, &records, &config);

            let narrative = narrator.narrate(&analysis).await;
            let report = report::build_report(&analysis, Some(&narrative));
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
