//! Console output for the interactive commands.
//!
//! Status lines go to stdout for the person running the probe; everything
//! diagnostic goes through `tracing` instead.

use crate::scenarios::ScenarioReport;
use owo_colors::OwoColorize;

pub fn success(message: &str) {
    println!("{} {}", "✅".green(), message.green());
}

pub fn failure(message: &str) {
    println!("{} {}", "❌".red(), message.red());
}

pub fn warning(message: &str) {
    println!("{}  {}", "⚠️".yellow(), message.yellow());
}

pub fn info(message: &str) {
    println!("{}  {}", "ℹ️".blue(), message);
}

/// Section banner.
pub fn header(title: &str) {
    let rule = "=".repeat(60);
    println!("\n{}", rule.dimmed());
    println!("{}", title.bold());
    println!("{}", rule.dimmed());
}

/// Show a secret the way pre-flight checks do: first 20 characters only.
pub fn mask(value: &str) -> String {
    const VISIBLE: usize = 20;
    if value.chars().count() <= VISIBLE {
        return value.to_string();
    }
    let visible: String = value.chars().take(VISIBLE).collect();
    format!("{}...", visible)
}

/// PASS/FAIL table for a list of named checks. Returns true when all passed.
pub fn summary(results: &[(String, bool)]) -> bool {
    header("📊 SUMMARY");

    for (name, passed) in results {
        if *passed {
            println!("{} {}", "PASS".green().bold(), name);
        } else {
            println!("{} {}", "FAIL".red().bold(), name);
        }
    }

    let passed = results.iter().filter(|(_, ok)| *ok).count();
    let total = results.len();
    println!();
    if passed == total {
        success(&format!("{}/{} checks passed", passed, total));
    } else {
        failure(&format!("{}/{} checks passed", passed, total));
    }

    passed == total
}

/// Print the outcome of a scripted call.
pub fn scenario_report(report: &ScenarioReport) {
    header(&format!("🏁 {} complete", report.scenario));

    println!("  {}      {}", "Call:".dimmed(), report.call_sid);
    println!(
        "  {}      {} frames, {} bytes",
        "Sent:".dimmed(),
        report.frames_sent,
        report.bytes_sent
    );
    println!(
        "  {}  {} responses, {} bytes",
        "Received:".dimmed(),
        report.responses,
        report.bytes_received
    );

    for path in &report.saved_files {
        println!("  {}     {}", "Saved:".dimmed(), path.display());
    }

    for note in &report.notes {
        println!("  {}      {}", "Note:".dimmed(), note);
    }

    if report.responses == 0 {
        warning("No AI audio was received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_long_value() {
        assert_eq!(mask("sk-abcdefghijklmnopqrstuvwxyz"), "sk-abcdefghijklmnopq...");
    }

    #[test]
    fn test_mask_short_value() {
        assert_eq!(mask("short"), "short");
        assert_eq!(mask(""), "");
    }
}
