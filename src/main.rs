//! Cellar CLI binary entry point.

use cellar::cli::{commands, Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cellar=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cellar = commands::open(cli.api_url)?;

    match cli.command {
        Commands::Login(args) => commands::handle_login(&cellar, args).await,
        Commands::Logout => commands::handle_logout(&cellar).await,
        Commands::Status => commands::handle_status(&cellar).await,
        Commands::Register(args) => commands::handle_register(&cellar, args).await,
        Commands::Wineries => commands::handle_wineries(&cellar).await,
        Commands::Use(args) => commands::handle_use(&cellar, args).await,
        Commands::Get(args) => commands::handle_get(&cellar, args).await,
    }
}
