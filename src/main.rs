mod ai;
mod db;
mod engine;
mod error;
mod fetch;
mod locate;
mod notify;
mod pdf;
mod resolver;
mod search;
mod service;

use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::ai::{Intent, TextOracle};
use crate::service::Service;

#[derive(Parser)]
#[command(name = "notifind", about = "Adaptive notification finder for institutional websites")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look for a notification on a site right now
    Find {
        /// Domain or full URL to search (e.g. nta.ac.in)
        domain_or_url: String,
        /// Notification name or keyword to look for
        name: String,
    },
    /// Route a free-text message: chat reply or notification lookup
    Ask {
        message: String,
    },
    /// Register a notification to be rechecked on a schedule
    Watch {
        domain_or_url: String,
        name: String,
        /// Email address to notify when the notification appears
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Process all active watch requests once (intended for cron)
    Recheck,
    /// Seed domain -> notifications-page mappings from a JSON file
    Seed {
        /// JSON array of {"domain", "notification_page_url"} objects
        #[arg(short, long)]
        file: std::path::PathBuf,
    },
    /// Recently recorded notifications
    List {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Learned fetch strategies per URL
    Strategies,
    /// Show store statistics
    Stats,
}

#[derive(serde::Deserialize)]
struct MappingSeed {
    domain: String,
    notification_page_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Find { domain_or_url, name } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let service = Service::new(&conn)?;
            let outcome = service.find_notification(&domain_or_url, &name).await?;
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Ask { message } => {
            let oracle = TextOracle::from_env();
            match ai::classify(&oracle, &message).await {
                Intent::Chat(answer) => {
                    println!("{answer}");
                    Ok(())
                }
                Intent::NotificationRequest { domain, phrase } => {
                    println!("Looking for \"{phrase}\" on {domain}...");
                    let conn = db::connect()?;
                    db::init_schema(&conn)?;
                    let service = Service::new(&conn)?;
                    let outcome = service.find_notification(&domain, &phrase).await?;
                    print_outcome(&outcome);
                    Ok(())
                }
            }
        }
        Commands::Watch { domain_or_url, name, email } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let id = db::insert_request(&conn, &domain_or_url, &name, email.as_deref())?;
            println!("Watching \"{}\" on {} (request #{})", name, domain_or_url, id);
            Ok(())
        }
        Commands::Recheck => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let service = Service::new(&conn)?;
            service.recheck_pending().await?;
            Ok(())
        }
        Commands::Seed { file } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let raw = std::fs::read_to_string(&file)?;
            let seeds: Vec<MappingSeed> = serde_json::from_str(&raw)?;
            let pairs: Vec<(String, String)> = seeds
                .into_iter()
                .map(|s| (s.domain, s.notification_page_url))
                .collect();
            let created = db::seed_mappings(&conn, &pairs)?;
            println!("Seeded {} new mappings ({} supplied)", created, pairs.len());
            Ok(())
        }
        Commands::List { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_notifications(&conn, limit)?;
            if rows.is_empty() {
                println!("No notifications recorded yet.");
                return Ok(());
            }
            println!(
                "{:>3} | {:<19} | {:<10} | {:<40} | {}",
                "#", "Recorded", "Published", "Title", "URL"
            );
            println!("{}", "-".repeat(110));
            for (i, row) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<19} | {:<10} | {:<40} | {}",
                    i + 1,
                    row.created_at,
                    row.published_at.as_deref().unwrap_or("-"),
                    truncate(&row.title, 40),
                    truncate(&row.url, 50),
                );
            }
            Ok(())
        }
        Commands::Strategies => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_strategies(&conn)?;
            if rows.is_empty() {
                println!("No strategy records yet.");
                return Ok(());
            }
            println!(
                "{:<50} | {:<8} | {:>5} | {:<19} | {:<19}",
                "URL", "Strategy", "Fails", "Last attempt", "Last success"
            );
            println!("{}", "-".repeat(114));
            for r in rows {
                println!(
                    "{:<50} | {:<8} | {:>5} | {:<19} | {:<19}",
                    truncate(&r.url, 50),
                    r.strategy.as_str(),
                    r.fail_count,
                    r.last_attempted_at,
                    r.last_succeeded_at.as_deref().unwrap_or("-"),
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Page mappings:      {}", s.mappings);
            println!("Strategy records:   {}", s.strategies);
            println!("Notifications:      {}", s.notifications);
            println!("Watch requests:     {} active / {} total", s.active_requests, s.total_requests);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_outcome(outcome: &service::FindOutcome) {
    println!("{}", outcome.message);
    if let Some(snippet) = &outcome.snippet {
        println!("\n--- Matched excerpt ---\n{}", snippet);
    }
    if let Some(url) = &outcome.document_url {
        println!("\nDocument: {}", url);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
