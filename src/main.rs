use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use braid_core::config::{AppConfig, StoreBackend};
use braid_core::types::{RunFilter, RunId, WorkflowStatus};
use braid_engine::{PersistentWorkflowExecutor, WorkflowExecutor};

#[derive(Parser)]
#[command(name = "braid", version, about = "Durable workflow orchestration with pause/resume")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "braid.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List persisted runs, newest first
    Runs {
        /// Only runs with this status (pending, running, paused, completed, failed, cancelled)
        #[arg(long)]
        status: Option<WorkflowStatus>,
        /// Only runs of this workflow
        #[arg(long)]
        workflow: Option<String>,
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Print the full state of a run as JSON
    Show {
        run_id: String,
    },
    /// Cancel a pending or paused run
    Cancel {
        run_id: String,
    },
    /// Delete a run from the store
    Delete {
        run_id: String,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("braid=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "braid", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)?;

    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    if config.store.backend == StoreBackend::Memory {
        warn!("Store backend is 'memory'; no runs persist between invocations");
    }
    let repository = braid_store::open(&config.store)?;

    match cli.command {
        Commands::Runs {
            status,
            workflow,
            limit,
        } => {
            let filter = RunFilter {
                status,
                workflow_id: workflow,
                limit: Some(limit),
            };
            let runs = repository.list(&filter).await?;
            if runs.is_empty() {
                println!("No runs found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<20} {:<10} {:<16} UPDATED",
                "RUN", "WORKFLOW", "STATUS", "NODE"
            );
            for run in &runs {
                println!(
                    "{:<38} {:<20} {:<10} {:<16} {}",
                    run.run_id,
                    run.workflow_id,
                    run.status,
                    run.current_node.as_deref().unwrap_or("-"),
                    run.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Show { run_id } => match repository.find(&RunId::from(run_id.as_str())).await? {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => anyhow::bail!("Run not found: {}", run_id),
        },
        Commands::Cancel { run_id } => {
            let engine = PersistentWorkflowExecutor::new(
                WorkflowExecutor::from_config(&config.engine),
                repository,
            );
            let state = engine.cancel(&RunId::from(run_id)).await?;
            info!(run_id = %state.run_id, workflow = %state.workflow_id, "Run cancelled");
            println!("Cancelled {}", state.run_id);
        }
        Commands::Delete { run_id } => {
            if repository.delete(&RunId::from(run_id.as_str())).await? {
                println!("Deleted {}", run_id);
            } else {
                anyhow::bail!("Run not found: {}", run_id);
            }
        }
        Commands::Config | Commands::Completions { .. } => {}
    }

    Ok(())
}
