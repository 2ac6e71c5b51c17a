//! hbgpio CLI - HummingBoard GPIO 节点宿主

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod doctor_cmd;
mod init_cmd;
mod pins_cmd;
mod run_cmd;

const DEFAULT_CONFIG: &str = "~/.hbgpio/flow.json";

#[derive(Parser)]
#[command(name = "hbgpio")]
#[command(about = "HummingBoard GPIO input/output nodes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start all nodes in the flow file
    Run {
        /// Flow configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
        /// Override the gpio command path
        #[arg(long)]
        gpio_command: Option<PathBuf>,
        /// Also print node reports to stdout
        #[arg(long)]
        reports: bool,
    },
    /// Print the physical to logical pin table
    Pins {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the gpio command and the flow file
    Doctor {
        /// Flow configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
    },
    /// Write an example flow file
    Init {
        /// Flow configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub(crate) fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 标准输出留给节点消息，日志写到标准错误
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hbgpio=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            gpio_command,
            reports,
        } => {
            run_cmd::run(&expand_path(&config), gpio_command, reports).await?;
        }
        Commands::Pins { json } => {
            pins_cmd::run(json)?;
        }
        Commands::Doctor { config } => {
            doctor_cmd::run(&expand_path(&config))?;
        }
        Commands::Init { config, force } => {
            init_cmd::run(&expand_path(&config), force)?;
        }
    }

    Ok(())
}
