use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use boardflow_core::config::AppConfig;
use boardflow_core::traits::LlmClient;
use boardflow_graph::{Board, GraphRunner, Router, StreamPrinter, Workers};

#[derive(Parser)]
#[command(name = "boardflow", version, about = "LLM-routed board graph executor")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "boardflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a board graph and print the run report
    Run {
        /// Path to the board JSON file
        #[arg(short, long)]
        graph: PathBuf,

        /// Cancel the run after this many seconds (overrides config; 0 = no timeout)
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Log per-node stream diagnostics
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; logs go to stderr so stdout stays clean for the
    // streamed node output and the final report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("boardflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run {
            graph,
            timeout_secs,
            verbose,
        } => run_board(config, &graph, timeout_secs, verbose).await,
    }
}

async fn run_board(
    mut config: AppConfig,
    graph_path: &PathBuf,
    timeout_secs: Option<u64>,
    verbose: bool,
) -> anyhow::Result<()> {
    if let Some(secs) = timeout_secs {
        config.run.timeout_secs = secs;
    }
    if verbose {
        config.run.verbose = true;
    }

    let board_json = std::fs::read_to_string(graph_path)?;
    let board = Board::from_json(&board_json)?;
    info!(
        nodes = board.nodes.len(),
        edges = board.edges.len(),
        "Loaded board"
    );

    let router_client: Arc<dyn LlmClient> = Arc::from(boardflow_llm::create_client(&config.router));
    let text_client: Arc<dyn LlmClient> = Arc::from(boardflow_llm::create_client(&config.text_worker));
    let vision_client: Arc<dyn LlmClient> =
        Arc::from(boardflow_llm::create_client(&config.vision_worker));

    let router = Router::new(router_client, config.router.clone());
    let workers = Workers {
        text: (text_client, config.text_worker.clone()),
        vision: (vision_client, config.vision_worker.clone()),
    };
    let printer = StreamPrinter::stdout(config.run.line_width);

    let cancel = CancellationToken::new();

    if config.run.timeout_secs > 0 {
        let timeout = std::time::Duration::from_secs(config.run.timeout_secs);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(secs = timeout.as_secs(), "Run timeout reached, cancelling");
            cancel.cancel();
        });
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let runner = GraphRunner::new(board, router, workers, printer, config.run.clone());
    let report = runner.run(cancel).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
