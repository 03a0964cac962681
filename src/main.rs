use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Local, Utc, Weekday};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sleep_insights::config::Config;
use sleep_insights::db::PgStore;
use sleep_insights::device::DeviceId;
use sleep_insights::engine::SystemClock;
use sleep_insights::models::{Intensity, NewNightmare};
use sleep_insights::month_scores::{
    daily_nightmare_counts, month_scores_or_placeholder, SleepApiClient, YearMonth,
};
use sleep_insights::source::{load_records, open_for_device, MonthScoreSource, NightmareLog};
use sleep_insights::staging::{read_stage_csv, score_night, score_record};
use sleep_insights::{report, Calendar, TimeWindow};

#[derive(Parser)]
#[command(name = "sleep-insights")]
#[command(about = "Sleep score and nightmare summaries per device", long_about = None)]
struct Cli {
    /// Device identifier; generated and persisted when omitted
    #[arg(long, global = true, env = "DEVICE_ID")]
    device_id: Option<String>,

    /// File holding the persisted device identifier
    #[arg(long, global = true, env = "DEVICE_ID_FILE")]
    device_id_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum WeekStart {
    Monday,
    Sunday,
}

impl From<WeekStart> for Weekday {
    fn from(start: WeekStart) -> Self {
        match start {
            WeekStart::Monday => Weekday::Mon,
            WeekStart::Sunday => Weekday::Sun,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample week of nights for this device
    Seed,
    /// Import sleep scores from a CSV file (timestamp,score[,source_key])
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the score average and nightmare count for a window
    Summary {
        #[arg(long, value_enum, default_value_t = TimeWindow::Week)]
        window: TimeWindow,
        #[arg(long, value_enum, default_value_t = WeekStart::Monday)]
        week_start: WeekStart,
    },
    /// Generate a markdown report for a window
    Report {
        #[arg(long, value_enum, default_value_t = TimeWindow::Week)]
        window: TimeWindow,
        #[arg(long, value_enum, default_value_t = WeekStart::Monday)]
        week_start: WeekStart,
        #[arg(long, default_value = "sleep-report.md")]
        out: PathBuf,
    },
    /// Append an entry to the nightmare log
    LogNightmare {
        /// Record a night without a nightmare
        #[arg(long)]
        none: bool,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(i64).range(1..=10))]
        intensity: i64,
        /// When it happened (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Show per-day scores for a month, with placeholders if unavailable
    MonthScores {
        /// Month as YYYY-MM; defaults to the current month
        #[arg(long)]
        month: Option<YearMonth>,
        /// Read from the database instead of the sleep API
        #[arg(long)]
        from_db: bool,
    },
    /// Show how many nightmares were logged on each day of a month
    NightmareCalendar {
        /// Month as YYYY-MM; defaults to the current month
        #[arg(long)]
        month: Option<YearMonth>,
    },
    /// Score a night from per-epoch stage probabilities and store it
    ScoreNight {
        /// Headerless CSV of unknown,nrem,rem,awake probabilities, one row per epoch
        #[arg(long)]
        stages: PathBuf,
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
        epoch_seconds: u32,
        /// Wake-up time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

/// Connects to Postgres and registers the device before any other query.
async fn open_store(config: &Config, device: &DeviceId) -> anyhow::Result<PgStore> {
    let store = PgStore::connect(config.database_url()?).await?;
    Ok(open_for_device(store, device).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let id_file = cli
        .device_id_file
        .unwrap_or_else(|| config.device_id_file.clone());
    let device = DeviceId::resolve(
        cli.device_id.as_deref().or(config.device_id.as_deref()),
        &id_file,
    );
    info!(device = %device, "Using device id");

    match cli.command {
        Commands::InitDb => {
            let store = PgStore::connect(config.database_url()?).await?;
            store.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = open_store(&config, &device).await?;
            store.seed(&device, Local::now().date_naive()).await?;
            println!("Seed data inserted for {device}.");
        }
        Commands::Import { csv } => {
            let store = open_store(&config, &device).await?;
            let inserted = store.import_scores_csv(&device, &csv).await?;
            println!("Inserted {inserted} sleep scores from {}.", csv.display());
        }
        Commands::Summary { window, week_start } => {
            let store = open_store(&config, &device).await?;
            let (scores, nightmares) = load_records(&store, &device).await;
            let summary = Calendar::new(week_start.into())
                .summarize_now(&SystemClock, &scores, &nightmares, window)?;

            if summary.filtered_scores.is_empty() {
                println!("No sleep scores found for this {window}.");
            } else {
                println!(
                    "Average sleep score {:.1} across {} nights this {window}",
                    summary.average,
                    summary.filtered_scores.len()
                );
            }
            println!("Nightmares this {window}: {}", summary.nightmare_count);
        }
        Commands::Report {
            window,
            week_start,
            out,
        } => {
            let store = open_store(&config, &device).await?;
            let (scores, nightmares) = load_records(&store, &device).await;
            let summary = Calendar::new(week_start.into())
                .summarize_now(&SystemClock, &scores, &nightmares, window)?;
            let report = report::build_report(&device, &summary);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::LogNightmare {
            none,
            description,
            intensity,
            at,
        } => {
            let store = open_store(&config, &device).await?;
            let entry = NewNightmare {
                occurred: !none,
                description,
                intensity: Intensity::try_from(intensity)?,
                timestamp: at.unwrap_or_else(Utc::now),
            };
            store.append_nightmare_record(&device, entry).await?;
            println!("Nightmare log updated.");
        }
        Commands::MonthScores { month, from_db } => {
            let month = month.unwrap_or_else(|| YearMonth::containing(Local::now().date_naive()));
            let source: Box<dyn MonthScoreSource> = if from_db {
                Box::new(open_store(&config, &device).await?)
            } else {
                Box::new(SleepApiClient::new(&config.sleep_api_url)?)
            };

            let scores =
                month_scores_or_placeholder(source.as_ref(), &device, month, &mut rand::rng())
                    .await;

            println!("Sleep scores for {month}:");
            for day in scores {
                println!("- {}: {}", day.date.format("%Y-%m-%d"), day.score);
            }
        }
        Commands::NightmareCalendar { month } => {
            let month = month.unwrap_or_else(|| YearMonth::containing(Local::now().date_naive()));
            let store = open_store(&config, &device).await?;
            let (_, nightmares) = load_records(&store, &device).await;
            let days = daily_nightmare_counts(&nightmares, month, &Local);

            println!("Nightmares in {month}: {}", days.iter().map(|day| day.count).sum::<usize>());
            for day in days {
                println!("- {}: {}", day.date.format("%Y-%m-%d"), day.count);
            }
        }
        Commands::ScoreNight {
            stages,
            epoch_seconds,
            at,
        } => {
            let epochs = read_stage_csv(&stages)?;
            let ended_at = at.unwrap_or_else(Utc::now);
            let night = score_night(&epochs, epoch_seconds);
            let record = score_record(ended_at, &epochs, epoch_seconds)?;

            let store = open_store(&config, &device).await?;
            let source_key = format!("night-{device}-{}", ended_at.to_rfc3339());
            store.record_score(&device, &record, &source_key).await?;

            info!(
                device = %device,
                epochs = epochs.len(),
                asleep_hours = night.asleep_hours(),
                "Night scored"
            );
            println!(
                "Sleep score {} ({:.1}h asleep; total {:.1}, nrem {:.1}, rem {:.1})",
                record.score,
                night.asleep_hours(),
                night.total_sleep_score,
                night.nrem_score,
                night.rem_score
            );
        }
    }

    Ok(())
}
