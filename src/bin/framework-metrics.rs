#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use framework_metrics::history::HistoryStore;
use framework_metrics::{run_dry, run_update, GithubGateway, RunConfig};

#[derive(Parser)]
#[command(
    name = "framework-metrics",
    version,
    about = "Append a GitHub metrics snapshot to the history document"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metrics for every tracked project and append a snapshot (default)
    Update(UpdateArgs),
    /// Print the most recent snapshot as JSON
    Latest {
        /// History document (default: data/metrics.json)
        #[arg(long)]
        history: Option<PathBuf>,
    },
}

#[derive(Args, Default)]
struct UpdateArgs {
    /// Tracked-project YAML (default: data/frameworks.yml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// History document (default: data/metrics.json)
    #[arg(long)]
    history: Option<PathBuf>,

    /// Number of repositories fetched concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-repository fetch timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Build and print the snapshot without writing the history document
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Update(UpdateArgs::default())) {
        Commands::Update(args) => {
            let mut config = RunConfig::from_env();
            if let Some(path) = args.config {
                config.config_path = path;
            }
            if let Some(path) = args.history {
                config.history_path = path;
            }
            if let Some(n) = args.concurrency {
                if n == 0 {
                    return Err("--concurrency must be >= 1".into());
                }
                config.concurrency = n;
            }
            if let Some(secs) = args.timeout_secs {
                if secs == 0 {
                    return Err("--timeout-secs must be >= 1".into());
                }
                config.fetch_timeout = Duration::from_secs(secs);
            }

            let gateway = GithubGateway::from_env(config.fetch_timeout)?;

            if args.dry_run {
                let summary = run_dry(&config, &gateway).await?;
                println!("{}", serde_json::to_string_pretty(&summary.snapshot)?);
                return Ok(());
            }

            let summary = run_update(&config, &gateway).await?;
            println!(
                "wrote {} - {} total snapshots",
                summary.history_path.display(),
                summary.total_snapshots
            );
        }
        Commands::Latest { history } => {
            let path = history.unwrap_or_else(|| RunConfig::from_env().history_path);
            let store = HistoryStore::new(&path);
            let doc = store.load()?;
            let latest = doc
                .latest()
                .ok_or_else(|| format!("no snapshots recorded in {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(latest)?);
        }
    }

    Ok(())
}
