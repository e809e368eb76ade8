use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recollect::config::Config;
use recollect_cli::commands::{
    CommitCommand, ConfigCommand, ContextCommand, RecentCommand, StoreCommand,
};
use recollect_cli::error::CliResult;
use recollect_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recollect-cli")]
#[command(about = "Recollect CLI - Assemble memory context and commit conversation turns")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to direct store directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Assemble the memory narrative for a message")]
    Context(ContextCommand),

    #[clap(about = "Record a conversation turn and wait for it to be visible")]
    Commit(CommitCommand),

    #[clap(about = "List the most recent conversation turns")]
    Recent(RecentCommand),

    #[clap(about = "Direct store commands")]
    Store(StoreCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,recollect=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.store.data_dir = data_dir;
    }

    match &cli.command {
        Command::Context(cmd) => cmd.execute(&config, format).await,
        Command::Commit(cmd) => cmd.execute(&config, format).await,
        Command::Recent(cmd) => cmd.execute(&config, format).await,
        Command::Store(cmd) => cmd.execute(&config, format).await,
        Command::Config(cmd) => cmd.execute(&config, format).await,
    }
}
