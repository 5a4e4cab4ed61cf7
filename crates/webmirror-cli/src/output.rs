//! Printing run results for humans and for machines.

use serde::Serialize;
use serde_json::json;
use webmirror::pipeline::{RunFailure, RunOutcome, RunReport};

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to encode output: {e}"),
    }
}

/// One-line summary of a finished run.
pub fn summary(report: &RunReport) -> String {
    let outcome = match &report.outcome {
        RunOutcome::CoreUnchanged => "entry document and manifest unchanged, assets skipped".to_string(),
        RunOutcome::Unchanged => "mirror already up to date".to_string(),
        RunOutcome::Published {
            revision: Some(revision),
        } => format!("published {revision}"),
        RunOutcome::Published { revision: None } => "published".to_string(),
        RunOutcome::NotPublished => "staged only, publishing disabled".to_string(),
    };
    format!(
        "{} [{}]: {} (converged on attempt {}, {} assets)",
        report.target, report.label, outcome, report.attempts, report.assets
    )
}

pub fn print_report(report: &RunReport, as_json: bool) {
    if as_json {
        print_json(report);
    } else {
        println!("  {}", summary(report));
    }
}

pub fn failure_json(failure: &RunFailure) -> serde_json::Value {
    json!({
        "error": true,
        "stage": failure.stage,
        "message": failure.to_string(),
    })
}
