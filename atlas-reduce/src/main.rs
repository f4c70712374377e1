use atlas::{Error, Result};
use atlas_reduce::stdio::serve;
use atlas_reduce::{ComputeWorker, WorkerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "atlas-reduce")]
#[command(about = "Atlas dimensionality reduction worker (PCA, UMAP, t-SNE) over JSON lines")]
#[command(version)]
struct Args {
    /// Read requests from a file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Minimum milliseconds between intermediate frames
    #[arg(long, default_value = "200")]
    interval_ms: u64,

    /// Frames buffered between the compute thread and stdout
    #[arg(long, default_value = "16")]
    channel_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            message_interval: Duration::from_millis(self.interval_ms),
            channel_capacity: self.channel_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: atlas-reduce panicked");
        eprintln!(
            "  Location: {}",
            panic_info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
    }));

    let args = Args::parse();

    args.log_level
        .parse::<LevelFilter>()
        .map_err(|_| Error::Config(format!("invalid log level '{}'", args.log_level)))?;
    atlas::tracing::init_with_filter(&args.log_level);

    let config = args.worker_config();
    config.validate()?;

    info!("Starting atlas-reduce {}", env!("CARGO_PKG_VERSION"));
    info!(
        "  interval={:?} channel_capacity={}",
        config.message_interval, config.channel_capacity
    );

    let worker = ComputeWorker::new(config);

    // Stdout is the protocol channel; nothing else may print to it.
    let mut stdout = std::io::stdout();
    let handled = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            serve(&worker, BufReader::new(file), &mut stdout, shutdown_signal()).await?
        }
        None => {
            serve(
                &worker,
                BufReader::new(tokio::io::stdin()),
                &mut stdout,
                shutdown_signal(),
            )
            .await?
        }
    };

    info!("atlas-reduce shutdown complete ({} requests)", handled);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
