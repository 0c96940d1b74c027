use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use quizmaster_core::api::ResourceKind;

#[derive(Debug, Parser)]
#[command(name = "quizmaster", version, about = "Quiz Master from the terminal")]
pub struct Cli {
    /// API base URL (overrides config and QUIZMASTER_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// View to open before running the command
    #[arg(long, global = true, default_value = "/dashboard")]
    pub at: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        qualification: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        date_of_birth: Option<String>,
    },
    /// End the session
    Logout,
    /// Show the profile the service holds for you
    Profile,
    /// Show the local session state
    Status,
    /// Navigate to a view and report where the guard lets you land
    Navigate { path: String },
    /// List the route table
    Routes,
    /// List a collection
    List {
        kind: ResourceKind,
        /// Filter as key=value, repeatable
        #[arg(short, long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,
    },
    /// Fetch one record
    Get { kind: ResourceKind, id: i64 },
    /// Create a record from a JSON payload
    Create { kind: ResourceKind, payload: String },
    /// Replace a record with a JSON payload
    Update {
        kind: ResourceKind,
        id: i64,
        payload: String,
    },
    /// Delete a record
    Delete { kind: ResourceKind, id: i64 },
    /// Show the dashboard summary
    Dashboard,
    /// Search (admin), e.g. -p q=cell -p type=quizzes
    Search {
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
    },
    /// Open a quiz for an attempt
    Attempt { quiz_id: i64 },
    /// Submit a quiz score from a JSON payload
    SubmitScore { payload: String },
    /// Download a CSV export
    Export {
        #[arg(value_enum)]
        target: ExportTarget,
        /// Directory to save into (defaults to config download_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportTarget {
    User,
    Admin,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {}", raw))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in {}", raw));
    }
    Ok((key.trim().to_string(), value.to_string()))
}
