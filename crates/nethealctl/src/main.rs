//! nethealctl - recover hung or degraded network interfaces
//!
//! The recovery engine is synchronous; it runs on tokio's blocking pool
//! while the async side listens for Ctrl-C and raises the cancel flag.

mod errors;
mod logging;
mod output;
mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netheal_common::{
    diagnose, Confirm, DryRunHost, NetHost, RecoveryConfig, RecoveryEngine, RecoveryError,
    RecoveryReport, ResetOutcome, RunOptions, SystemHost,
};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "nethealctl")]
#[command(about = "Network interface recovery for hung or degraded links", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $NETHEAL_CONFIG, then /etc/netheal/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log file, overrides `log_path` from the config
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reset, renew and verify until connectivity is back
    Fix {
        /// Interface to recover (default: default-route interface)
        interface: Option<String>,

        /// Skip the initial connectivity check
        #[arg(long)]
        force: bool,

        /// Answer yes to the healthy-network prompt
        #[arg(short, long)]
        yes: bool,

        /// Log every change instead of applying it
        #[arg(long)]
        dry_run: bool,

        /// Print the recovery report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show topology, hang evidence and planned strategies without changing anything
    Diagnose {
        interface: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Disable offload features now and at every boot
    Workaround {
        interface: String,

        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".bright_red().bold(), e);
            errors::EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config =
        RecoveryConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = cli.log_file {
        config.log_path = path;
    }
    logging::init(&config.log_path, cli.verbose);
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Fix {
            interface,
            force,
            yes,
            dry_run,
            json,
        } => {
            let report = fix(config, interface, RunOptions { force }, yes, dry_run).await?;
            if json {
                output::print_json(&report)?;
            } else {
                output::print_report(&report);
            }
            Ok(report.exit_code())
        }
        Commands::Diagnose { interface, json } => {
            let report = tokio::task::spawn_blocking(move || {
                let engine = RecoveryEngine::new(SystemHost::new(), config);
                let target = engine.resolve_target(interface.as_deref())?;
                diagnose(engine.host(), engine.config(), &target)
            })
            .await
            .context("Diagnosis task failed")??;

            if json {
                output::print_json(&report)?;
            } else {
                output::print_diagnosis(&report);
            }
            Ok(errors::EXIT_SUCCESS)
        }
        Commands::Workaround { interface, dry_run } => {
            let outcome = tokio::task::spawn_blocking(move || {
                if dry_run {
                    workaround(DryRunHost::new(SystemHost::new()), config, &interface)
                } else {
                    workaround(SystemHost::new(), config, &interface)
                }
            })
            .await
            .context("Workaround task failed")??;

            output::print_outcome(&outcome);
            Ok(errors::exit_code(outcome.succeeded))
        }
    }
}

async fn fix(
    config: RecoveryConfig,
    interface: Option<String>,
    options: RunOptions,
    yes: bool,
    dry_run: bool,
) -> Result<RecoveryReport> {
    let cancel = Arc::new(AtomicBool::new(false));
    listen_for_interrupt(Arc::clone(&cancel));

    let report = tokio::task::spawn_blocking(move || {
        let confirm = move |question: &str| yes || prompt::confirm(question);
        if dry_run {
            info!("Dry run: changes are logged, not applied");
            recover(
                DryRunHost::new(SystemHost::new()),
                config,
                cancel,
                interface.as_deref(),
                options,
                &confirm,
            )
        } else {
            recover(
                SystemHost::new(),
                config,
                cancel,
                interface.as_deref(),
                options,
                &confirm,
            )
        }
    })
    .await
    .context("Recovery task failed")??;

    Ok(report)
}

fn recover<H: NetHost>(
    host: H,
    config: RecoveryConfig,
    cancel: Arc<AtomicBool>,
    interface: Option<&str>,
    options: RunOptions,
    confirm: &dyn Confirm,
) -> Result<RecoveryReport, RecoveryError> {
    RecoveryEngine::new(host, config)
        .with_cancel_flag(cancel)
        .run(interface, options, confirm)
}

fn workaround<H: NetHost>(
    host: H,
    config: RecoveryConfig,
    interface: &str,
) -> Result<ResetOutcome, RecoveryError> {
    RecoveryEngine::new(host, config).apply_workaround(interface)
}

/// First Ctrl-C stops after the current attempt, a second one exits at once
fn listen_for_interrupt(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current attempt");
        cancel.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, exiting");
            std::process::exit(errors::EXIT_FAILURE);
        }
    });
}
