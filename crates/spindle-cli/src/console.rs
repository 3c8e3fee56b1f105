//! Terminal output for a build run.

use crossterm::style::Stylize;
use spindle_core::{BuildSummary, Reporter};

/// Prints progress to stdout and diagnostics to stderr.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        println!();
        println!("{}", title.dark_grey());
    }

    fn package_started(&self, name: &str, title: &str, updating: bool) {
        let verb = if updating { "Updating" } else { "Building" };
        println!("  {} {name} {}", verb.cyan(), format!("({title})").dark_grey());
    }

    fn package_done(&self, name: &str, detail: &str) {
        println!("  {} {name} {}", "✓".green(), detail.dark_grey());
    }

    fn package_skipped(&self, name: &str, reason: &str) {
        println!("  {} {name} {}", "-".dark_grey(), reason.dark_grey());
    }

    fn package_failed(&self, name: &str, reason: &str) {
        eprintln!("  {} {name}: {reason}", "✗".red());
    }

    fn info(&self, msg: &str) {
        println!("  {}", msg.dark_grey());
    }

    fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "warning:".yellow().bold());
    }

    fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "error:".red().bold());
    }

    fn summary(&self, summary: &BuildSummary) {
        println!();
        println!(
            "{} built, {} skipped, {} failed ({} packages)",
            summary.built.len().to_string().green(),
            summary.skipped.len(),
            if summary.failed.is_empty() {
                "0".to_string().stylize()
            } else {
                summary.failed.len().to_string().red().bold()
            },
            summary.total()
        );
        if !summary.skipped.is_empty() {
            println!("  {} {}", "Skipped:".dark_grey(), summary.skipped.join(", "));
        }
        if !summary.failed.is_empty() {
            eprintln!("  {} {}", "Failed:".red(), summary.failed.join(", "));
        }
    }
}
