//! vaultctl - replay credit-vault scenarios against in-memory collaborators
//!
//! # Examples
//!
//! ```bash
//! # replay a scenario, human-readable
//! vaultctl run scenarios/borrow_and_repay.toml
//!
//! # one JSON object per step on stdout
//! vaultctl run scenarios/borrow_and_repay.toml --json
//!
//! # validate a scenario and print its vault config
//! vaultctl check scenarios/borrow_and_repay.toml
//! ```

mod scenario;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credit_vault::VaultEvent;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scenario::{format_units, Replay, Scenario, StepReport, AMOUNT_DECIMALS};

#[derive(Parser, Debug)]
#[command(name = "vaultctl")]
#[command(about = "pooled collateral vault scenario runner", long_about = None)]
struct Cli {
    /// log filter, overrides RUST_LOG (e.g. "debug" or "credit_vault=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay every step of a scenario
    Run {
        /// Scenario TOML file
        scenario: PathBuf,

        /// Print one JSON object per step instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a scenario and print the vault config it builds
    Check {
        /// Scenario TOML file
        scenario: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Commands::Run { scenario, json } => run_command(&scenario, json),
        Commands::Check { scenario } => check_command(&scenario),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "vaultctl=info,credit_vault=info".into()),
    };

    // stdout carries the report; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run_command(path: &Path, json: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let replay = Replay::build(&scenario)?;
    info!(path = %path.display(), steps = scenario.steps.len(), "replaying scenario");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let reports = replay.run(&scenario.steps, |report| {
        if json {
            let line = serde_json::to_string(report).context("failed to encode report")?;
            writeln!(out, "{}", line)?;
        } else {
            print_report(&mut out, report)?;
        }
        Ok(())
    })?;

    let rejected = reports.iter().filter(|r| !r.ok).count();
    info!(steps = reports.len(), rejected, "scenario complete");
    Ok(())
}

fn check_command(path: &Path) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let replay = Replay::build(&scenario)?;

    let config = scenario.vault.to_toml_string()?;
    println!("{}", config.trim_end());
    println!();
    println!(
        "ok: {} assets, {} reserves, {} steps",
        replay.vault.assets().len(),
        scenario.reserves.len(),
        scenario.steps.len()
    );
    Ok(())
}

fn print_report(out: &mut impl Write, report: &StepReport) -> Result<()> {
    let who = report.user.map(|u| format!(" {}", u)).unwrap_or_default();
    match &report.error {
        None => writeln!(out, "#{:<3} {}{}", report.step, report.action, who)?,
        Some(error) => writeln!(out, "#{:<3} {}{} rejected: {}", report.step, report.action, who, error)?,
    }

    for event in &report.events {
        writeln!(out, "     {}", describe(event))?;
    }
    if let Some(position) = &report.position {
        for asset in position.assets.iter().filter(|a| a.collateral > 0 || a.debt > 0) {
            writeln!(
                out,
                "     {} collateral {} debt {}",
                asset.asset,
                format_units(asset.collateral, AMOUNT_DECIMALS),
                format_units(asset.debt, AMOUNT_DECIMALS),
            )?;
        }
        writeln!(
            out,
            "     borrow capacity {}",
            format_units(position.borrow_capacity, AMOUNT_DECIMALS)
        )?;
    }
    if let Some(hf) = report.health_factor {
        writeln!(out, "     health factor {}", hf)?;
    }
    Ok(())
}

fn describe(event: &VaultEvent) -> String {
    let units = |amount| format_units(amount, AMOUNT_DECIMALS);
    match event {
        VaultEvent::Deposited {
            asset,
            amount,
            shares_minted,
            ..
        } => format!("deposited {} of {} for {} shares", units(*amount), asset, shares_minted),
        VaultEvent::Withdrawn {
            asset,
            amount,
            shares_burned,
            ..
        } => format!("withdrew {} of {} burning {} shares", units(*amount), asset, shares_burned),
        VaultEvent::Borrowed { asset, amount, .. } => {
            format!("borrowed {} of {}", units(*amount), asset)
        }
        VaultEvent::Repaid {
            asset,
            amount,
            principal_reduced,
            ..
        } => format!(
            "repaid {} of {} retiring {} principal",
            units(*amount),
            asset,
            units(*principal_reduced)
        ),
        VaultEvent::AssetRegistered { asset, ltv_bps, symbol } => {
            format!("registered {} ({}) at {} bps", symbol, asset, ltv_bps)
        }
        VaultEvent::AssetStatusChanged { asset, active } => {
            format!("{} {}", asset, if *active { "activated" } else { "deactivated" })
        }
    }
}
