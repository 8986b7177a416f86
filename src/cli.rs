// Command-line front end: argument parsing, logging setup, and the
// sequence of config load, roster load, reconciliation and output.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roster_sync::api::MailchimpClient;
use roster_sync::config::{default_config_path, Config};
use roster_sync::reconcile::{reconcile, ReportTarget, RunMode};
use roster_sync::roster::Roster;
use roster_sync::ui;

#[derive(Parser, Debug)]
#[command(
    name = "roster-sync",
    version,
    about = "Reconcile a CSV contact roster against a Mailchimp audience"
)]
pub struct CliArgs {
    /// Roster CSV: email, first name, last name[, note[, role]]
    #[arg(required_unless_present = "check")]
    pub roster: Option<PathBuf>,

    /// Config file (default: <config dir>/roster-sync/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Create or update missing and pending members (overrides `run.push`)
    #[arg(long, conflicts_with = "report")]
    pub push: bool,

    /// Only write a report of missing and pending members (overrides `run.push`)
    #[arg(long)]
    pub report: bool,

    /// Directory for the report file (overrides `run.report_dir`)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Do not ask for confirmation before pushing
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Only verify the configured credentials and exit
    #[arg(long)]
    pub check: bool,

    /// API key (overrides `mailchimp.api_key`)
    #[arg(long, env = "ROSTER_SYNC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(args: CliArgs) -> Result<()> {
    init_logging(args.verbose);

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load(&config_path, args.api_key.as_deref())?;
    let client = MailchimpClient::new(&config.mailchimp).context("Failed to build HTTP client")?;

    if args.check {
        client.ping().context("Credential check failed")?;
        println!("Credentials OK for list {}", config.mailchimp.list_id);
        return Ok(());
    }

    let mode = if args.push {
        RunMode::Push
    } else if args.report {
        RunMode::Report
    } else {
        config.run_mode()
    };

    let Some(roster_path) = args.roster.as_deref() else {
        bail!("a roster file is required");
    };
    let mut roster = Roster::load(roster_path)
        .with_context(|| format!("Failed to load roster {}", roster_path.display()))?;

    if mode == RunMode::Push && !args.yes && !ui::confirm_push(&config.mailchimp.list_id)? {
        println!("Aborted.");
        return Ok(());
    }

    let target = ReportTarget {
        dir: args
            .output_dir
            .clone()
            .or_else(|| config.run.report_dir.clone())
            .unwrap_or_else(|| PathBuf::from(".")),
        prefix: config.run.report_prefix.clone(),
    };

    info!(?mode, contacts = roster.len(), list = %config.mailchimp.list_id, "starting reconciliation");
    let mut progress = ui::ProgressReporter::new(roster.len(), args.json);
    let summary = reconcile(&mut roster, &client, mode, &target, &mut progress);
    progress.finish();
    let summary = summary?;

    if args.json {
        ui::print_json(&summary)?;
    } else {
        ui::print_summary(&summary);
    }
    Ok(())
}
