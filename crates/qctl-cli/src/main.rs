//! Command-line front-end for `qctl`. Thin: every subcommand is one call
//! into `qctl_core::AdminApi` or `qctl_core::Supervisor`; this binary only
//! owns argument parsing, JSON decoding, output formatting, and the
//! subscriber/exit-code plumbing around them.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use qctl_core::{
    default_log_dir, AdminApi, Categorizable, FileLogSink, JobSpec, JobState, ListFilter,
    PurgePredicate, QctlError, Supervisor,
};
use qctl_store_sqlite::SqliteJobStore;

const DEFAULT_DB_PATH: &str = "./qctl.db";

#[derive(Parser)]
#[command(name = "qctl")]
#[command(about = "A durable, single-node background job queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database file
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job from a JSON spec
    Enqueue {
        /// JSON object with at least "id" and "command"
        json: String,
    },
    /// Worker pool management
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },
    /// Report supervisor and job-count status
    Status,
    /// List jobs, optionally filtered by state
    List {
        #[arg(long)]
        state: Option<String>,
    },
    /// Dead Letter Queue operations
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    /// Read or write a recognized config key
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Remove jobs matching a selector
    Purge {
        /// Remove completed jobs (the only selector this version supports)
        #[arg(long)]
        completed: bool,
    },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// Start the supervisor and its worker pool; blocks until shutdown
    Start {
        #[arg(long, default_value_t = 1)]
        count: i64,
    },
    /// Signal a running supervisor to shut down
    Stop,
}

#[derive(Subcommand)]
enum DlqAction {
    /// List dead jobs
    List,
    /// Requeue a dead job back to pending
    Retry { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Read a config key
    Get { key: String },
    /// Write a config key
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let db_path = cli.db.to_string_lossy().into_owned();
    let store = match SqliteJobStore::open(&db_path).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("failed to open store at {db_path}: {err}");
            return ExitCode::from(1);
        }
    };

    match run(cli.command, store).await {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(command: Commands, store: Arc<SqliteJobStore>) -> qctl_core::Result<()> {
    let admin = AdminApi::new(store.clone());

    match command {
        Commands::Enqueue { json } => {
            let spec: JobSpec = serde_json::from_str(&json)
                .map_err(|err| QctlError::InvalidSpec(err.to_string()))?;
            let id = admin.enqueue(spec).await?;
            println!("enqueued job '{id}'");
            Ok(())
        }

        Commands::Worker { action } => match action {
            WorkerAction::Start { count } => {
                let log_sink = Arc::new(FileLogSink::new(default_log_dir()));
                log_sink
                    .ensure_dir()
                    .await
                    .map_err(|err| QctlError::StoreError(err.into()))?;
                let supervisor = Supervisor::new(store.clone(), log_sink, count);
                supervisor.start().await
            }
            WorkerAction::Stop => Supervisor::stop(store.as_ref()).await,
        },

        Commands::Status => {
            let status = admin.status().await?;
            println!("running:       {}", status.running);
            if let Some(pid) = status.pid {
                println!("pid:           {pid}");
            }
            if let Some(started_at) = status.started_at {
                println!("started_at:    {started_at}");
            }
            println!("worker_count:  {}", status.worker_count);
            println!("jobs by state:");
            let mut counts: Vec<_> = status.job_counts.into_iter().collect();
            counts.sort_by(|a, b| a.0.cmp(&b.0));
            for (state, count) in counts {
                println!("  {state:<10} {count}");
            }
            Ok(())
        }

        Commands::List { state } => {
            let filter = ListFilter {
                state: state
                    .as_deref()
                    .map(|s| {
                        JobState::parse(s)
                            .ok_or_else(|| QctlError::InvalidSpec(format!("unknown state '{s}'")))
                    })
                    .transpose()?,
                ..Default::default()
            };
            print_jobs(admin.list(filter).await?);
            Ok(())
        }

        Commands::Dlq { action } => match action {
            DlqAction::List => {
                print_jobs(admin.dlq_list().await?);
                Ok(())
            }
            DlqAction::Retry { id } => {
                admin.dlq_retry(&id).await?;
                println!("requeued '{id}'");
                Ok(())
            }
        },

        Commands::Config { action } => match action {
            ConfigAction::Get { key } => {
                match admin.config_get(&key).await? {
                    Some(value) => println!("{value}"),
                    None => println!("(unset)"),
                }
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                admin.config_set(&key, &value).await?;
                println!("{key} = {value}");
                Ok(())
            }
        },

        Commands::Purge { completed } => {
            if !completed {
                return Err(QctlError::InvalidSpec(
                    "purge requires a selector, e.g. --completed".to_string(),
                ));
            }
            let removed = admin.purge(PurgePredicate::Completed).await?;
            println!("purged {removed} job(s)");
            Ok(())
        }
    }
}

fn print_jobs(jobs: Vec<qctl_core::Job>) {
    if jobs.is_empty() {
        println!("no jobs");
        return;
    }
    println!(
        "{:<20} {:<10} {:<9} {:>3} {:>9} {:<10}",
        "id", "state", "priority", "att", "exit_code", "run_at"
    );
    for job in jobs {
        println!(
            "{:<20} {:<10} {:>8} {:>3} {:>9} {:<10}",
            job.id,
            job.state.as_str(),
            job.priority,
            job.attempts,
            job.exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            job.run_at.to_rfc3339(),
        );
    }
}
