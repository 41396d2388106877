// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HDDS Partition Router CLI
//!
//! # Usage
//!
//! ```bash
//! # Replay a discovery trace against a dry-run routing engine
//! hdds-partition-router run --config prouter.toml --events trace.jsonl
//!
//! # Generate an example configuration
//! hdds-partition-router gen-config --output prouter.toml
//!
//! # Validate a configuration file
//! hdds-partition-router validate --config prouter.toml
//! ```

use clap::{Parser, Subcommand};
use hdds_partition_router::replay;
use hdds_partition_router::{
    Commander, CommanderStatsSnapshot, DryRunTransport, LifecycleEvent, PartitionObserver,
    RecordingListener, ServiceConfig, TemplateCommandBuilder,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// HDDS Partition Router
#[derive(Parser, Debug)]
#[command(name = "hdds-partition-router")]
#[command(about = "HDDS Partition Router - Partition-aware routing session management")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a discovery trace and print the resulting commands
    Run {
        /// Configuration file path (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Discovery trace (JSON lines)
        #[arg(short, long)]
        events: PathBuf,

        /// Maximum time to wait for pending commands (seconds)
        #[arg(long, default_value = "30")]
        settle_timeout: u64,
    },

    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "prouter.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Run {
            config,
            events,
            settle_timeout,
        } => {
            let config = match config {
                Some(path) => ServiceConfig::from_file(path)?,
                None => ServiceConfig::default(),
            };
            init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));
            cmd_run(config, events, Duration::from_secs(settle_timeout)).await
        }
        Commands::GenConfig { output } => {
            init_logging(args.log_level.as_deref().unwrap_or("info"));
            cmd_gen_config(output)
        }
        Commands::Validate { config } => {
            init_logging(args.log_level.as_deref().unwrap_or("info"));
            cmd_validate(config)
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn cmd_run(
    config: ServiceConfig,
    events: PathBuf,
    settle_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = replay::load_script(&events)?;

    let observer = PartitionObserver::new(config.build_filters()?)?;
    let transport = Arc::new(DryRunTransport::new());
    let builder = Arc::new(TemplateCommandBuilder::new(
        config.commander.target_router.clone(),
        config.naming.clone(),
    ));
    let commander = Arc::new(Commander::new(
        config.commander.commander_config(),
        builder,
        transport.clone(),
    )?);
    let recorder = Arc::new(RecordingListener::new());

    observer.add_listener(recorder.clone());
    observer.add_listener(commander.clone());

    println!("HDDS Partition Router v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!("Service: {}", config.name);
    let timings = commander.config();
    println!("Target:  {}", timings.target_router);
    println!(
        "Retry:   every {:?}, {:?} per request",
        timings.retry_delay, timings.request_timeout
    );
    println!("Trace:   {} ({} events)", events.display(), script.len());
    println!();

    for event in &script {
        event.apply(&observer);
    }
    tokio::task::block_in_place(|| observer.flush())?;

    if tokio::time::timeout(settle_timeout, commander.settled())
        .await
        .is_err()
    {
        tracing::warn!(
            pending = commander.pending(),
            "commands still pending after {:?}",
            settle_timeout
        );
    }

    println!("Lifecycle events:");
    for event in recorder.events() {
        println!("  {}", describe(&event));
    }
    println!();

    println!("Commands:");
    for request in transport.sent() {
        println!("  {:<6} {}", request.kind.as_str(), request.entity());
    }
    println!();

    println!("Live sessions:");
    for snapshot in observer.snapshot() {
        let routes: Vec<String> = snapshot
            .routes
            .iter()
            .map(|(route, count)| format!("{} x{}", route, count))
            .collect();
        println!("  {}: {}", snapshot.session, routes.join(", "));
    }
    println!();

    print_stats(&commander.stats());

    observer.close();
    commander.shutdown();
    commander.closed().await;
    Ok(())
}

fn describe(event: &LifecycleEvent) -> String {
    match event {
        LifecycleEvent::CreateSession(session) => format!("create session {}", session),
        LifecycleEvent::DeleteSession(session) => format!("delete session {}", session),
        LifecycleEvent::CreateTopicRoute(session, route) => {
            format!("create route   {} / {}", session, route)
        }
        LifecycleEvent::DeleteTopicRoute(session, route) => {
            format!("delete route   {} / {}", session, route)
        }
    }
}

fn print_stats(stats: &CommanderStatsSnapshot) {
    println!("--- Commander Statistics ---");
    println!(
        "  {} attempts, {} acknowledged, {} rejected, {} timed out, {} superseded, {} naming errors",
        stats.attempts,
        stats.successes,
        stats.failures,
        stats.timeouts,
        stats.superseded,
        stats.naming_errors
    );
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&ServiceConfig::example())?;

    let content = format!(
        r#"# HDDS Partition Router Configuration
# Generated by hdds-partition-router gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match ServiceConfig::from_file(&config_path) {
        Ok(config) => {
            let filters = config.build_filters()?;
            println!("Configuration valid!");
            println!();
            println!("Service: {}", config.name);
            println!(
                "Target:  {} (retry {} ms, timeout {} ms)",
                config.commander.target_router,
                config.commander.retry_delay_ms,
                config.commander.request_timeout_ms
            );
            println!("Domain route: {}", config.naming.domain_route);
            println!("Filters: {}", filters.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
