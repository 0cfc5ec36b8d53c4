mod analyze;
mod bvid;
mod tasks;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::analyze::AnalyzeArgs;
use crate::bvid::BvidCommands;

#[derive(Debug, Parser)]
#[command(name = "bilirank")]
#[command(about = "Bilibili comment analysis and brand ranking")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one analysis task and write its report
    Analyze(AnalyzeArgs),
    /// Convert between BV short ids and numeric aids
    Bvid {
        #[command(subcommand)]
        command: BvidCommands,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Task maintenance
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Recover interrupted tasks, then run the sweep and purge jobs until
    /// stopped
    Daemon,
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check the database connection
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum TaskCommands {
    /// Re-run tasks interrupted by a restart and fail stale ones
    Recover,
    /// Fail active tasks whose heartbeat is stale
    Sweep,
    /// Delete raw comments past the retention window
    Purge {
        /// Override the configured retention in days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Print a stored task
    Show { task_id: String },
    /// Print the stored report of a task as JSON
    Report {
        task_id: String,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // bvid conversion is pure; it needs neither config nor logging.
    if let Some(Commands::Bvid { command }) = &cli.command {
        bvid::run_bvid(command)?;
        return Ok(());
    }

    let config = bilirank_core::load_app_config()?;
    init_tracing(&config.log_level)?;

    match cli.command {
        Some(Commands::Analyze(args)) => analyze::run_analyze(&config, &args).await?,
        Some(Commands::Bvid { .. }) => {}
        Some(Commands::Db { command }) => {
            let pool = bilirank_db::connect_from_app_config(&config).await?;
            match command {
                DbCommands::Ping => {
                    bilirank_db::ping(&pool).await?;
                    println!("database connection ok");
                }
                DbCommands::Migrate => {
                    let applied = bilirank_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
        Some(Commands::Tasks { command }) => {
            let pool = bilirank_db::connect_from_app_config(&config).await?;
            match command {
                TaskCommands::Recover => tasks::run_recover(pool, &config).await?,
                TaskCommands::Sweep => tasks::run_sweep(pool, &config).await?,
                TaskCommands::Purge { days } => tasks::run_purge(pool, &config, days).await?,
                TaskCommands::Show { task_id } => tasks::run_show(&pool, &task_id).await?,
                TaskCommands::Report { task_id, output } => {
                    tasks::run_report(&pool, &task_id, output.as_deref()).await?;
                }
            }
        }
        Some(Commands::Daemon) => tasks::run_daemon(&config).await?,
        None => {
            println!("bilirank: no command given, see --help");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
