//! Terminal rendering of reports

use anyhow::{Context, Result};
use netheal_common::diagnose::InterfaceRole;
use netheal_common::orchestrator::manual_steps;
use netheal_common::verify::DiagnosticsDump;
use netheal_common::{DiagnosisReport, RecoveryReport, RecoveryStatus, ResetOutcome};
use owo_colors::OwoColorize;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing report")?;
    println!("{}", json);
    Ok(())
}

fn status_label(status: RecoveryStatus) -> String {
    match status {
        RecoveryStatus::Recovered => "[RECOVERED]".bright_green().bold().to_string(),
        RecoveryStatus::Declined => "[HEALTHY]".bright_green().to_string(),
        RecoveryStatus::Failed => "[FAILED]".bright_red().bold().to_string(),
        RecoveryStatus::Interrupted => "[INTERRUPTED]".bright_yellow().bold().to_string(),
    }
}

fn outcome_line(outcome: &ResetOutcome) -> String {
    let result = if outcome.succeeded {
        "ok".green().to_string()
    } else {
        "failed".red().to_string()
    };
    let mut line = format!(
        "{:<12} {:<16} {}",
        outcome.interface,
        outcome.strategy_used.as_str(),
        result
    );
    if let Some(planned) = outcome.fallback_from {
        line.push_str(&format!(" {}", format!("(instead of {})", planned).yellow()));
    }
    line
}

pub fn print_report(report: &RecoveryReport) {
    println!();
    println!("{} {}", status_label(report.status), report.interface.bold());

    for attempt in &report.attempts {
        println!();
        println!("  {}", format!("Attempt {}", attempt.attempt).bright_white());
        for member in &attempt.skipped_members {
            println!("    {:<12} {}", member, "skipped (virtual)".dimmed());
        }
        for outcome in &attempt.resets {
            println!("    {}", outcome_line(outcome));
        }
        match &attempt.service_restarted {
            Some(unit) => println!("    {:<12} restarted", unit),
            None => println!("    {}", "no network service restarted".dimmed()),
        }
        if !attempt.dhcp_renewed {
            println!("    {}", "DHCP renewal failed".yellow());
        }
        match attempt.verification.reached_target() {
            Some(target) => println!("    {} {}", "reachable:".green(), target),
            None if attempt.verification.results.is_empty() => {}
            None => println!("    {}", "no target reachable".red()),
        }
    }

    if !report.workaround_units.is_empty() {
        println!();
        println!("  Boot-time workaround:");
        for unit in &report.workaround_units {
            println!("    {}", unit.cyan());
        }
    }

    if report.status == RecoveryStatus::Failed {
        if let Some(dump) = &report.diagnostics {
            print_dump(dump);
        }
        println!();
        println!("  {}", "Manual intervention required:".bright_red().bold());
        for step in manual_steps(report) {
            println!("    - {}", step);
        }
    }
    println!();
}

fn print_dump(dump: &DiagnosticsDump) {
    println!();
    println!("  {}", format!("Diagnostics for {}", dump.interface).bright_white());
    for line in dump.address_state.as_deref().unwrap_or("(unavailable)").lines() {
        println!("    {}", line.dimmed());
    }
    for line in dump.routes.as_deref().unwrap_or("(unavailable)").lines() {
        println!("    {}", line.dimmed());
    }
    let dns = if dump.dns_resolved {
        "resolves".green().to_string()
    } else {
        "does not resolve".red().to_string()
    };
    println!("    dns {} {}", dump.dns_host, dns);
}

pub fn print_diagnosis(report: &DiagnosisReport) {
    println!();
    let connectivity = if report.connectivity {
        "[OK]".bright_green().to_string()
    } else {
        "[DOWN]".bright_red().to_string()
    };
    println!("{} {}", connectivity, report.interface.bold());

    if let Some(route) = &report.default_route {
        println!(
            "  default route via {} dev {}",
            route.gateway.as_deref().unwrap_or("-"),
            route.interface.as_deref().unwrap_or("-")
        );
    } else {
        println!("  {}", "no default route".yellow());
    }
    println!();

    for entry in &report.interfaces {
        let role = match entry.role {
            InterfaceRole::Primary => "interface",
            InterfaceRole::BridgeMember => "member",
        };
        let kind = if entry.descriptor.is_bridge {
            "bridge"
        } else if entry.descriptor.is_virtual {
            "virtual"
        } else {
            "physical"
        };
        let hang = match &entry.hang {
            Some(evidence) if evidence.found => "HANG".bright_red().bold().to_string(),
            Some(_) => "no hang".green().to_string(),
            None => "-".dimmed().to_string(),
        };
        let plan = match entry.planned_strategy {
            Some(strategy) => format!("{:<16}", strategy.as_str()),
            None => format!("{:<16}", "skip").dimmed().to_string(),
        };
        println!(
            "  {:<9} {:<12} {:<8} {:<10} {} {}",
            role,
            entry.descriptor.name,
            kind,
            entry.descriptor.driver_label(),
            plan,
            hang
        );
    }
    println!();
}

pub fn print_outcome(outcome: &ResetOutcome) {
    println!("{}", outcome_line(outcome));
    for action in &outcome.actions {
        println!("  {}", action.dimmed());
    }
}
