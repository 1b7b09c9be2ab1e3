mod chat;
mod cron_cmds;

use crate::config::{Config, get_config_path, load_config};
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agentcore")]
#[command(about = "Agent orchestration core: chat with a Planner/Coder team, manage cron jobs")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session against the Planner/Coder team
    Chat {
        /// Run a single message non-interactively instead of a REPL
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Manage scheduled cron jobs
    Cron {
        #[command(subcommand)]
        cmd: CronCommands,
    },
}

#[derive(Subcommand)]
pub enum CronCommands {
    /// List scheduled jobs
    List {
        #[arg(long, short = 'a')]
        all: bool,
    },
    /// Add a new job
    Add {
        #[arg(long, short = 'n')]
        name: String,
        #[arg(long, short = 't')]
        task: String,
        #[arg(long)]
        every_ms: Option<i64>,
        #[arg(long)]
        cron: Option<String>,
        #[arg(long)]
        tz: Option<String>,
        #[arg(long)]
        at_ms: Option<i64>,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// Remove a job
    Remove {
        #[arg(long)]
        id: String,
    },
    /// Enable a disabled job
    Enable {
        #[arg(long)]
        id: String,
    },
    /// Disable an enabled job without removing it
    Disable {
        #[arg(long)]
        id: String,
    },
    /// Run a job immediately, independent of its schedule
    Run {
        #[arg(long)]
        id: String,
    },
}

fn resolve_config() -> Result<Config> {
    let path = get_config_path().ok();
    load_config(path.as_deref())
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = resolve_config()?;

    match cli.command {
        Commands::Chat { message } => chat::run(config, message).await,
        Commands::Cron { cmd } => cron_cmds::run(config, cmd).await,
    }
}
