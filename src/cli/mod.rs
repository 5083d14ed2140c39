//! CLI entry point for Cellar.

pub mod commands;

use clap::{Parser, Subcommand};

/// Cellar session CLI
#[derive(Parser, Debug)]
#[command(name = "cellar", version, about = "Cellar winery ERP session client")]
pub struct Cli {
    /// Override the API base URL (default: $CELLAR_API_URL or localhost)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with email and password
    Login(LoginArgs),
    /// Sign out and forget stored credentials
    Logout,
    /// Show session and winery status
    Status,
    /// Create a new account
    Register(RegisterArgs),
    /// List the wineries you belong to
    Wineries,
    /// Select the active winery
    Use(UseArgs),
    /// Send an authorized GET request and print the JSON response
    Get(GetArgs),
}

/// Arguments for `cellar login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    #[arg(short, long)]
    pub email: String,

    #[arg(short, long, env = "CELLAR_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Arguments for `cellar register`.
#[derive(Parser, Debug)]
pub struct RegisterArgs {
    #[arg(short, long)]
    pub email: String,

    #[arg(long)]
    pub full_name: String,

    #[arg(short, long, env = "CELLAR_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Arguments for `cellar use`.
#[derive(Parser, Debug)]
pub struct UseArgs {
    /// Winery id (UUID)
    pub winery_id: uuid::Uuid,
}

/// Arguments for `cellar get`.
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Path relative to the API base URL, e.g. /equipment/tanks/
    pub path: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
