pub mod broker;
pub mod jobs;
pub mod profile;
pub mod report;
pub mod run;
pub mod status;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::config::{
    ACTION_TIMEOUT_ENV, CAPTCHA_POLL_INTERVAL_ENV, CAPTCHA_TIMEOUT_ENV, CAPTCHA_URL_ENV,
    DEFAULT_ACTION_TIMEOUT_SECS, DEFAULT_CAPTCHA_POLL_INTERVAL_SECS, DEFAULT_CAPTCHA_TIMEOUT_SECS,
    DEFAULT_EMAIL_TIMEOUT_SECS, DEFAULT_WORKERS, EMAIL_TIMEOUT_ENV, EMAIL_URL_ENV,
    RUNTIME_URL_ENV, WORKERS_ENV,
};
use crate::model::processor::OperationType;

#[derive(Parser)]
#[command(
    name = "broker-scrub",
    version,
    about = "Find your records on data broker sites and get them removed"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import and inspect broker definitions
    Broker {
        #[command(subcommand)]
        command: BrokerCommand,
    },
    /// Set or show the profile to search for
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// List scheduled jobs
    Jobs {
        /// Which jobs to list (scan, opt-out, all)
        #[arg(long, default_value = "all")]
        operation: OperationType,
        /// Only jobs due by this time (RFC 3339); defaults to now
        #[arg(long, conflicts_with = "all_dates")]
        due_by: Option<DateTime<Utc>>,
        /// List every job regardless of its next run date
        #[arg(long)]
        all_dates: bool,
    },
    /// Run the jobs that are due
    Run(RunArgs),
    /// Show per-broker progress
    Status,
    /// Generate a report of matches and removals
    Report {
        /// Output format
        #[arg(long, default_value = "terminal", value_parser = ["terminal", "json"])]
        format: String,
        /// Output file path (stdout if not specified)
        #[arg(long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BrokerCommand {
    /// Load every broker definition (*.json) from a directory
    Import {
        /// Directory of definitions; defaults to the config dir's `brokers/`
        dir: Option<PathBuf>,
    },
    /// List imported brokers
    List,
    /// Show a broker's steps, schedule and mirror sites
    Info {
        /// Broker name, e.g. verecor.com
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Replace the profile; one search runs per name and location
    Set {
        /// Full name, "First [Middle] Last" (repeatable)
        #[arg(long = "name", required = true)]
        names: Vec<String>,
        /// "City,ST" (repeatable)
        #[arg(long = "location", required = true)]
        locations: Vec<String>,
        /// Phone number (repeatable)
        #[arg(long = "phone")]
        phones: Vec<String>,
        #[arg(long)]
        birth_year: i32,
    },
    /// Show the stored profile queries
    Show,
}

#[derive(Args)]
pub struct RunArgs {
    /// Which jobs to run (scan, opt-out, all)
    #[arg(long, default_value = "all")]
    pub operation: OperationType,
    /// Automation runtime base URL
    #[arg(long, env = RUNTIME_URL_ENV)]
    pub runtime_url: Option<String>,
    /// Captcha solving service base URL
    #[arg(long, env = CAPTCHA_URL_ENV)]
    pub captcha_url: Option<String>,
    /// Email relay service base URL
    #[arg(long, env = EMAIL_URL_ENV)]
    pub email_url: Option<String>,
    /// Number of broker/profile pairs worked on at once
    #[arg(long, env = WORKERS_ENV, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,
    /// Seconds to wait for a single action
    #[arg(long, env = ACTION_TIMEOUT_ENV, default_value_t = DEFAULT_ACTION_TIMEOUT_SECS)]
    pub action_timeout: u64,
    /// Seconds to wait for a captcha solution
    #[arg(long, env = CAPTCHA_TIMEOUT_ENV, default_value_t = DEFAULT_CAPTCHA_TIMEOUT_SECS)]
    pub captcha_timeout: u64,
    /// Seconds between captcha solution polls
    #[arg(
        long,
        env = CAPTCHA_POLL_INTERVAL_ENV,
        default_value_t = DEFAULT_CAPTCHA_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub captcha_poll_interval: u64,
    /// Seconds to wait for a confirmation email
    #[arg(long, env = EMAIL_TIMEOUT_ENV, default_value_t = DEFAULT_EMAIL_TIMEOUT_SECS)]
    pub email_timeout: u64,
    /// Run jobs due by this time (RFC 3339) instead of now
    #[arg(long)]
    pub due_by: Option<DateTime<Utc>>,
    /// Use the in-process scripted runtime and save nothing
    #[arg(long)]
    pub dry_run: bool,
}
