// UI layer: confirmation prompt, progress bar and the end-of-run summary.
// Everything here writes to the terminal; the reconciliation itself lives
// in `reconcile` and never touches stdout.

use std::io::IsTerminal;

use anyhow::Result;
use crossterm::style::{style, Stylize};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::contact::{Contact, SubscriptionStatus};
use crate::reconcile::{Progress, PushAction, PushOutcome, RunMode, RunSummary};

/// Ask before mutating the remote list. Returns `true` without asking when
/// stdin is not a terminal (scripts are expected to know what they run).
pub fn confirm_push(list_id: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    let answer = Confirm::new()
        .with_prompt(format!(
            "Push mode will create or update members on list {list_id}. Continue?"
        ))
        .default(false)
        .interact()?;
    Ok(answer)
}

/// Progress bar over remote calls. Hidden when output is machine-readable.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(contacts: usize, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(contacts as u64)
        };
        if let Ok(bar_style) = ProgressStyle::with_template("{spinner} {msg:<10} [{bar:30}] {pos}/{len}") {
            bar.set_style(bar_style.progress_chars("=> "));
        }
        bar.set_message("lookup");
        ProgressReporter { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Progress for ProgressReporter {
    fn lookup_done(&mut self, _contact: &Contact) {
        self.bar.inc(1);
    }

    fn push_started(&mut self, total: usize) {
        self.bar.set_message("push");
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn push_done(&mut self, _outcome: &PushOutcome) {
        self.bar.inc(1);
    }
}

/// Human-readable summary on stdout.
pub fn print_summary(summary: &RunSummary) {
    println!(
        "{} contacts loaded ({} rows skipped)",
        summary.contacts, summary.rejected_rows
    );
    for status in SubscriptionStatus::ALL {
        let count = summary.statuses.get(&status).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }
        let label = style(format!("{:<14}", status.as_str()));
        let label = if status.needs_action() { label.yellow() } else { label.green() };
        println!("  {label} {count}");
    }
    if summary.unknown > 0 {
        println!("  {} {}", style(format!("{:<14}", "unknown")).red(), summary.unknown);
        for failure in &summary.lookup_failures {
            println!("    {} {}", failure.email, style(&failure.error).dim());
        }
    }

    match summary.mode {
        RunMode::Push => print_pushes(&summary.pushes),
        RunMode::Report => {
            if let Some(path) = &summary.report_path {
                println!(
                    "Wrote {} contact(s) to {}",
                    summary.reported,
                    style(path.display()).bold()
                );
            }
        }
    }
}

fn print_pushes(pushes: &[PushOutcome]) {
    if pushes.is_empty() {
        println!("Nothing to push.");
        return;
    }
    for push in pushes {
        let verb = match push.action {
            PushAction::Create => "create",
            PushAction::Update => "update",
        };
        match &push.error {
            None => println!("  {} {verb} {}", style("ok").green(), push.email),
            Some(e) => println!("  {} {verb} {}: {e}", style("failed").red(), push.email),
        }
    }
    let failed = pushes.iter().filter(|p| !p.ok).count();
    println!("Pushed {} of {} contact(s)", pushes.len() - failed, pushes.len());
}

/// Machine-readable summary on stdout.
pub fn print_json(summary: &RunSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
