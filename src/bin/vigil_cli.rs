use std::path::PathBuf;
use structopt::StructOpt;

use vigil::config::Config;
use vigil::models::{ActivityType, ActorKind, AlertFilter, AlertStatus, Severity};
use vigil::persistence::{AlertStore, SqliteAlertStore};

/// Vigil behavioral security engine command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "vigil", about = "Behavioral security engine CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// List alerts from the database
    Alerts {
        /// Path to the alert database
        #[structopt(short, long, default_value = "alerts.db")]
        db: PathBuf,
        /// Filter by status (new, investigating, confirmed, false_positive, resolved)
        #[structopt(long)]
        status: Option<String>,
        /// Filter by severity (low, medium, high, critical)
        #[structopt(long)]
        severity: Option<String>,
        /// Filter by activity type
        #[structopt(long)]
        activity_type: Option<String>,
        /// Filter by actor kind
        #[structopt(long)]
        actor_kind: Option<String>,
        /// Maximum number of alerts to show
        #[structopt(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show one alert with its full action log
    Show {
        /// Path to the alert database
        #[structopt(short, long, default_value = "alerts.db")]
        db: PathBuf,
        /// Alert id
        id: i64,
    },
    /// Show aggregate alert statistics
    Stats {
        /// Path to the alert database
        #[structopt(short, long, default_value = "alerts.db")]
        db: PathBuf,
    },
    /// Follow an event file and print parsed events
    Tail {
        /// Path to the JSONL event file
        #[structopt(short, long)]
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Alerts {
            db,
            status,
            severity,
            activity_type,
            actor_kind,
            limit,
        } => {
            let store = open_store(&db)?;
            let filter = AlertFilter {
                status: parse_filter(status.as_deref(), AlertStatus::parse, "status")?,
                severity: parse_filter(severity.as_deref(), Severity::parse, "severity")?,
                activity_type: parse_filter(
                    activity_type.as_deref(),
                    ActivityType::parse,
                    "activity type",
                )?,
                actor_kind: parse_filter(actor_kind.as_deref(), ActorKind::parse, "actor kind")?,
                since: None,
                until: None,
                limit: Some(limit),
            };

            let alerts = store.list(&filter)?;
            println!("{} alert(s):\n", alerts.len());
            for alert in alerts {
                println!(
                    "  #{} [{}/{}] {} - {} ({})",
                    alert.id,
                    alert.severity.as_str(),
                    alert.status.as_str(),
                    alert.activity_type.as_str(),
                    alert.description,
                    alert.actor_id.as_deref().unwrap_or("anonymous"),
                );
            }
        }
        Cli::Show { db, id } => {
            let store = open_store(&db)?;
            match store.get(id)? {
                Some(alert) => {
                    println!("Alert #{}", alert.id);
                    println!("  Created:     {}", alert.created_at);
                    println!("  Actor:       {} ({})",
                        alert.actor_id.as_deref().unwrap_or("anonymous"),
                        alert.actor_kind.as_str());
                    println!("  Type:        {}", alert.activity_type.as_str());
                    println!("  Severity:    {}", alert.severity.as_str());
                    println!("  Confidence:  {}", alert.confidence);
                    println!("  Status:      {}", alert.status.as_str());
                    println!("  Description: {}", alert.description);
                    println!("  Details:     {}", alert.details);
                    if let Some(ref reviewer) = alert.reviewed_by {
                        println!("  Reviewed by: {}", reviewer);
                    }
                    if !alert.actions.is_empty() {
                        println!("  Actions:");
                        for action in &alert.actions {
                            println!(
                                "    [{}] {} ({})",
                                action.taken_at,
                                action.action,
                                action.taken_by.as_deref().unwrap_or("system"),
                            );
                        }
                    }
                }
                None => {
                    eprintln!("Alert {} not found", id);
                    std::process::exit(1);
                }
            }
        }
        Cli::Stats { db } => {
            let store = open_store(&db)?;
            let now = chrono::Utc::now().timestamp();
            let stats = store.stats(now)?;

            println!("Alert statistics:");
            println!("  Total:      {}", stats.total);
            println!("  New:        {}", stats.new_alerts);
            println!("  Today:      {}", stats.today);
            println!("  This week:  {}", stats.week);
            println!("  By severity:");
            for (severity, count) in &stats.by_severity {
                println!("    {:12} {}", severity, count);
            }
            println!("  By type:");
            for (activity_type, count) in &stats.by_type {
                println!("    {:24} {}", activity_type, count);
            }
        }
        Cli::Tail { file } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let mut tailer = vigil::input::EventTailer::new(file);
            tailer.initialize()?;
            println!("Following event file, Ctrl+C to stop...");

            loop {
                for event in tailer.read_events()? {
                    println!(
                        "  [{}] {} {} {} from {} ({})",
                        event.timestamp,
                        event.actor_id.as_deref().unwrap_or("anonymous"),
                        event.http_method,
                        event.endpoint,
                        event.source_ip,
                        event.actor_kind.as_str(),
                    );
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
        }
    }

    Ok(())
}

fn open_store(db: &PathBuf) -> Result<SqliteAlertStore, Box<dyn std::error::Error>> {
    if !db.exists() {
        eprintln!("Database not found: {:?}", db);
        std::process::exit(1);
    }
    Ok(SqliteAlertStore::new(db)?)
}

fn parse_filter<T>(
    value: Option<&str>,
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> Result<Option<T>, Box<dyn std::error::Error>> {
    match value {
        Some(s) => match parse(s) {
            Some(v) => Ok(Some(v)),
            None => Err(format!("Invalid {}: {}", what, s).into()),
        },
        None => Ok(None),
    }
}
