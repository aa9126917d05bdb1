use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{header, run, version};

#[derive(Parser)]
#[command(name = "ifgen")]
#[command(about = "Bridge a packet stack to byte-oriented transports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring up the interfaces of a configuration file and exchange probes
    Run(run::RunArgs),

    /// Decode a framed packet header
    Header(header::HeaderArgs),

    /// Show version information
    Version(version::VersionArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = dispatch().await {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

async fn dispatch() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run::run(args).await?,
        Commands::Header(args) => header::run(args)?,
        Commands::Version(args) => version::run(args),
    }

    Ok(())
}
