use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::path::PathBuf;

use compass_navigator::config::Config;

mod demo;

#[derive(Parser)]
#[command(name = "compass-navigator")]
#[command(about = "Headless harness for the compass window/navigation runtime")]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted navigation session and print the window stack after each step
    Demo {
        /// Print the transcript as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger to file (truncate on each run)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("compass-navigator.log")?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let cli = Cli::parse();
    info!("Starting compass-navigator");

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    debug!("Effective config: {:?}", config);

    match cli.command {
        Commands::Demo { json } => demo::run(&config, json).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}
