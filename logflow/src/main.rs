use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logflow::cancellation::CancellationToken;
use logflow::config::EtlConfig;
use logflow::etl::{build_log_etl_executor, EtlCollaborators, JsonlTableSink, LocalDirObjectStore, ObjectStore};
use logflow::events::LoggingEventSink;
use logflow::observability::init_logging;
use logflow::state::{JsonlRunStore, RunRecord, RunStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "logflow", version, about = "Run the log ETL DAG against local files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the DAG once and print the run record as JSON.
    Run {
        /// JSON configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory served as the source bucket. Without it, buckets are
        /// subdirectories of the working directory.
        #[arg(long)]
        input_dir: Option<PathBuf>,

        /// JSON-lines file the feature rows are appended to.
        #[arg(long, default_value = "features.jsonl")]
        output: PathBuf,

        /// JSON-lines file run records are appended to.
        #[arg(long)]
        run_store: Option<PathBuf>,
    },

    /// Load and validate a configuration, then print it resolved.
    Validate {
        /// JSON configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the most recent run record from a run store.
    Last {
        /// JSON-lines run store.
        #[arg(long)]
        run_store: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            input_dir,
            output,
            run_store,
        } => {
            let config = EtlConfig::load(config.as_deref()).context("loading configuration")?;
            init_logging(&config.logging)?;

            let record = run(&config, input_dir, output, run_store).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.status != logflow::core::RunStatus::Success {
                std::process::exit(1);
            }
        }
        Command::Validate { config } => {
            let config = EtlConfig::load(config.as_deref()).context("loading configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Last { run_store } => {
            let store = JsonlRunStore::new(run_store);
            match store.latest().await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("no runs recorded in {}", store.path().display()),
            }
        }
    }

    Ok(())
}

async fn run(
    config: &EtlConfig,
    input_dir: Option<PathBuf>,
    output: PathBuf,
    run_store: Option<PathBuf>,
) -> Result<RunRecord> {
    let store: Arc<dyn ObjectStore> = match input_dir {
        Some(dir) => Arc::new(LocalDirObjectStore::single_bucket(dir)),
        None => Arc::new(LocalDirObjectStore::new(".")),
    };
    let sink = JsonlTableSink::open(&output)
        .await
        .with_context(|| format!("opening output {}", output.display()))?;
    let collaborators = EtlCollaborators::new(store, Arc::new(sink));

    let mut executor =
        build_log_etl_executor(config, &collaborators)?.with_event_sink(Arc::new(LoggingEventSink::debug()));
    if let Some(path) = run_store {
        executor = executor.with_run_store(Arc::new(JsonlRunStore::new(path)));
    }

    let cancel = Arc::new(CancellationToken::new());
    let signal = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel("interrupted");
            }
        })
    };

    info!(dag = %config.dag_name, bucket = %config.source.bucket, "Starting run");
    let report = executor.run_with_cancel(cancel).await;
    signal.abort();

    Ok(RunRecord::from_report(&report))
}
