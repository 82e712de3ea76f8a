use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;

use opstriage::analysis::{CorrelatedEvent, RcaResult};
use opstriage::config::TriageConfig;
use opstriage::detect::{Anomaly, LogEntry, MetricSnapshot};

#[derive(Parser)]
#[command(
    name = "opstriage",
    about = "Automated anomaly detection and root cause analysis for operational signals",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults to $OPSTRIAGE_CONFIG, then /etc/opstriage/opstriage.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect anomalies in log entries and metric snapshots
    Detect {
        /// JSON array of log entries
        #[arg(long)]
        logs: Option<PathBuf>,

        /// JSON array of metric snapshots, processed in order
        #[arg(long)]
        metrics: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Infer the root cause of correlated anomaly groups
    Analyze {
        /// JSON array of correlated events
        #[arg(long)]
        events: PathBuf,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Detect, then analyze everything found as one correlated group
    Triage {
        /// JSON array of log entries
        #[arg(long)]
        logs: Option<PathBuf>,

        /// JSON array of metric snapshots, processed in order
        #[arg(long)]
        metrics: Option<PathBuf>,

        /// Affected component (repeatable)
        #[arg(long = "component")]
        components: Vec<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the active rule set
    Rules {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = TriageConfig::resolve(cli.config.as_deref())?;

    init_tracing(&config);
    tracing::debug!(%source, "configuration resolved");

    match cli.command {
        Commands::Detect { logs, metrics, json } => {
            let logs: Vec<LogEntry> = read_optional(logs.as_deref())?;
            let snapshots: Vec<MetricSnapshot> = read_optional(metrics.as_deref())?;

            let mut detector = config.build_detector()?;
            let mut anomalies = detector.detect_log_anomalies(&logs);
            for snapshot in &snapshots {
                anomalies.extend(detector.detect_metric_anomalies(snapshot.iter().map(|(k, v)| (k, *v))));
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&anomalies)?);
            } else {
                print_anomalies(&anomalies);
            }
        }
        Commands::Analyze { events, json } => {
            let events: Vec<CorrelatedEvent> = read_json(&events)?;
            let mut engine = config.build_engine()?;
            let result = engine.analyze_root_cause(&events);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
        }
        Commands::Triage {
            logs,
            metrics,
            components,
            json,
        } => {
            let logs: Vec<LogEntry> = read_optional(logs.as_deref())?;
            let snapshots: Vec<MetricSnapshot> = read_optional(metrics.as_deref())?;
            let report = opstriage::run_triage(&config, &logs, &snapshots, &components)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_anomalies(&report.anomalies);
                print_result(&report.analysis);
            }
        }
        Commands::Rules { json } => {
            let engine = config.build_engine()?;
            if json {
                println!("{}", serde_json::to_string_pretty(engine.rules())?);
            } else {
                println!("{:<8} | {:<32} | {:<6} | Description", "Id", "Root Cause", "Prior");
                println!("{:-<8}-|-{:-<32}-|-{:-<6}-|-{:-<30}", "", "", "", "");
                for rule in engine.rules() {
                    println!(
                        "{:<8} | {:<32} | {:<6.2} | {}",
                        rule.id, rule.root_cause, rule.confidence_prior, rule.description
                    );
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(config: &TriageConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn read_optional<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => read_json(path),
        None => Ok(T::default()),
    }
}

fn print_anomalies(anomalies: &[Anomaly]) {
    if anomalies.is_empty() {
        println!("No anomalies detected.");
        return;
    }
    println!("{:<18} | {:<8} | {:<20} | Description", "Type", "Severity", "Metric");
    println!("{:-<18}-|-{:-<8}-|-{:-<20}-|-{:-<40}", "", "", "", "");
    for a in anomalies {
        println!(
            "{:<18} | {:<8} | {:<20} | {}",
            a.kind.to_string(),
            a.severity.to_string(),
            a.metric_name,
            a.description
        );
    }
}

fn print_result(result: &RcaResult) {
    println!("\n=== Root Cause Analysis ===");
    println!("Root Cause: {}", result.root_cause);
    println!("Confidence: {:.0}%", result.confidence * 100.0);
    if let Some(rule) = &result.matched_rule {
        println!("Rule:       {}", rule);
    }
    if !result.affected_components.is_empty() {
        let components: Vec<&str> = result.affected_components.iter().map(String::as_str).collect();
        println!("Affected:   {}", components.join(", "));
    }
    if !result.causal_chain.is_empty() {
        println!("\nCausal Chain:");
        for step in &result.causal_chain {
            println!("  {}", step);
        }
    }
    println!("\nRecommendations:");
    for (i, rec) in result.recommendations.iter().enumerate() {
        println!("  {}. {}", i + 1, rec);
    }
    println!("===========================\n");
}
