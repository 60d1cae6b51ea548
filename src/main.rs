use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pacer::config::Config;
use pacer::desk::{CommandLine, CommandSource, CommandTarget, CycleOutcome, CycleReport, PostingDesk};
use pacer::outcome::Outcome;
use pacer::scheduler::RngDraw;
use pacer::storage::StorageBackend;

#[derive(Parser)]
#[command(
    name = "pacer",
    version,
    about = "Posting cadence scheduler with diversity tracking and spam gating",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding persisted state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend (json, sqlite)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Result format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pattern, eligibility, counters and backoff
    Status,

    /// Show the content diversity report
    Diversity,

    /// Show recent posting records
    History {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Switch the active posting pattern
    Pattern {
        /// Pattern name (conservative, moderate, active, or a custom one)
        name: String,
    },

    /// Clear posting history and the diversity window
    Reset {
        /// Required; nothing is cleared without it
        #[arg(long, default_value = "false")]
        confirm: bool,

        /// Also return to the configured default pattern
        #[arg(long, default_value = "false")]
        default_pattern: bool,
    },

    /// Run the quality gate on a file (first line is the title, "-" reads stdin)
    Gate {
        file: PathBuf,
    },

    /// Evaluate now and, when eligible, generate, gate, publish and record
    Run {
        /// Command printing a candidate as JSON
        #[arg(long)]
        generator: String,

        /// Command receiving the accepted candidate as JSON on stdin
        #[arg(long)]
        publisher: String,

        /// Candidates requested before giving up
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Seed for the natural-skip draw
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    let desk = PostingDesk::from_config(&config).context("Failed to open posting state")?;
    tracing::debug!(desk = ?desk, "pacer starting");

    let now = Utc::now();
    match cli.command {
        Commands::Status => emit(&desk.status(now)?, cli.output, |s| {
            let mut lines = vec![
                format!(
                    "pattern:   {} ({}-{}h, {}/day, {}/week, hours {})",
                    s.pattern.name,
                    s.pattern.min_delay_hours,
                    s.pattern.max_delay_hours,
                    s.pattern.daily_limit,
                    s.pattern.weekly_limit,
                    s.pattern.preferred_hours
                ),
                format!("decision:  {}", s.decision),
                format!("next slot: {}", s.next_suggested_time.to_rfc3339()),
                format!(
                    "posts:     {} today, {} this week, {} in 7 days, {} records total",
                    s.stats.today, s.stats.this_week, s.stats.last_7d, s.stats.total_records
                ),
            ];
            if let Some(rate) = s.stats.success_rate {
                lines.push(format!("success:   {:.0}%", rate * 100.0));
            }
            if s.backoff.active {
                lines.push(format!(
                    "backoff:   x{} after {} consecutive failure(s)",
                    s.backoff.multiplier, s.backoff.consecutive_failures
                ));
            }
            lines.join("\n")
        }),

        Commands::Diversity => emit(&desk.diversity_report()?, cli.output, |r| {
            let mut lines = vec![
                format!("entries: {}", r.total),
                format!("score:   {:.1}", r.diversity_score),
            ];
            for (category, count) in &r.category_distribution {
                lines.push(format!("  {category}: {count}"));
            }
            let keywords: Vec<String> =
                r.top_keywords.iter().map(|(k, n)| format!("{k} ({n})")).collect();
            if !keywords.is_empty() {
                lines.push(format!("keywords: {}", keywords.join(", ")));
            }
            lines.push(format!(
                "next:    {} / {} / {}",
                r.recommendation.preferred_category,
                r.recommendation.preferred_style,
                r.recommendation.preferred_angle
            ));
            lines.extend(r.advice.iter().map(|a| format!("- {a}")));
            lines.join("\n")
        }),

        Commands::History { limit } => emit(&desk.history(limit)?, cli.output, |records| {
            if records.is_empty() {
                return "no records".to_string();
            }
            records
                .iter()
                .map(|r| {
                    format!(
                        "{}  {:<9} {:<12} {}",
                        r.timestamp.to_rfc3339(),
                        r.outcome.id(),
                        r.category,
                        r.title.as_deref().or(r.note.as_deref()).unwrap_or("")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }),

        Commands::Pattern { name } => emit(&desk.set_pattern(&name)?, cli.output, |p| {
            format!("active pattern: {}", p.name)
        }),

        Commands::Reset {
            confirm,
            default_pattern,
        } => emit(&desk.reset(confirm, default_pattern)?, cli.output, |s| {
            format!(
                "cleared {} record(s) and {} diversity entr(ies); pattern {}",
                s.cleared_records, s.cleared_entries, s.pattern
            )
        }),

        Commands::Gate { file } => {
            let (title, body) = read_post(&file)?;
            emit(&desk.quality_check(&title, &body)?, cli.output, |v| {
                let mut lines = vec![format!(
                    "{} ({})",
                    if v.passed { "PASS" } else { "FAIL" },
                    v.summary()
                )];
                for violation in &v.violations {
                    lines.push(format!(
                        "- {}{}: {}",
                        violation.kind.id(),
                        if violation.blocking { " [blocking]" } else { "" },
                        violation.detail
                    ));
                }
                lines.push(format!("title: {}", v.normalized_title));
                lines.join("\n")
            })
        }

        Commands::Run {
            generator,
            publisher,
            max_attempts,
            seed,
        } => {
            let source = CommandSource::new(
                CommandLine::parse(&generator).context("--generator must not be empty")?,
            );
            let target = CommandTarget::new(
                CommandLine::parse(&publisher).context("--publisher must not be empty")?,
            );
            let mut settings = config.cycle.clone();
            if let Some(max_attempts) = max_attempts {
                settings.max_attempts = max_attempts.max(1);
            }
            if settings.longest_cycle_secs() >= config.storage.lock_stale_secs {
                anyhow::bail!(
                    "--max-attempts {} makes a cycle longer than storage.lock_stale_secs ({}s)",
                    settings.max_attempts,
                    config.storage.lock_stale_secs
                );
            }

            tracing::info!(
                generator = %generator,
                publisher = %publisher,
                max_attempts = settings.max_attempts,
                "Starting posting cycle"
            );

            let mut draw = match seed {
                Some(seed) => RngDraw::seeded(seed),
                None => RngDraw::from_entropy(),
            };
            let outcome = desk
                .run_cycle_until(now, &source, &target, &settings, &mut draw, shutdown_signal())
                .await?;
            emit(&outcome, cli.output, describe_cycle)
        }
    }
}

/// Completes on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
    tracing::warn!("Shutdown requested, abandoning the current call");
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if let Some(backend) = &cli.backend {
        config.storage.backend = backend
            .parse::<StorageBackend>()
            .map_err(anyhow::Error::msg)?;
    }
    config.validate()?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("pacer=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("pacer={level},warn"))
            .context("Invalid log level")?
    };

    // Results go to stdout; logs stay on stderr
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

/// Title on the first non-empty line, body after it
fn read_post(path: &Path) -> Result<(String, String)> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read post file: {}", path.display()))?
    };

    let content = content.trim_start();
    let (title, body) = content.split_once('\n').unwrap_or((content, ""));
    Ok((title.trim().to_string(), body.trim().to_string()))
}

fn describe_cycle(report: &CycleReport) -> String {
    let detail = match &report.outcome {
        CycleOutcome::Published {
            title,
            fingerprint,
            receipt,
        } => {
            let location = receipt
                .url
                .as_deref()
                .or(receipt.id.as_deref())
                .unwrap_or("no receipt");
            format!("published \"{title}\" [{}] -> {location}", fingerprint.short())
        }
        CycleOutcome::Skipped { reason } => format!("skipped: {reason}"),
        CycleOutcome::Rejected { attempts, reasons } => {
            format!("rejected after {attempts} attempt(s): {}", reasons.join("; "))
        }
        CycleOutcome::Failed { stage, error } => format!("{stage} failed: {error}"),
    };
    format!("[{}] {detail}", report.pattern)
}

/// Print an operation result; invalid input exits with status 2
fn emit<T: Serialize>(
    outcome: &Outcome<T>,
    format: OutputFormat,
    render: impl Fn(&T) -> String,
) -> Result<ExitCode> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(match outcome {
            Outcome::InvalidInput { .. } => ExitCode::from(2),
            _ => ExitCode::SUCCESS,
        });
    }

    match outcome {
        Outcome::Ok { value } => println!("{}", render(value)),
        Outcome::Blocked { reason } => println!("blocked: {reason}"),
        Outcome::InvalidInput { message } => {
            eprintln!("error: {message}");
            return Ok(ExitCode::from(2));
        }
        Outcome::StorageCorrupt { value, warnings } => {
            for warning in warnings {
                eprintln!("warning: {warning}");
            }
            println!("{}", render(value));
        }
    }
    Ok(ExitCode::SUCCESS)
}
