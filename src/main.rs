use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod classifier;
mod classifiers;
mod config;
mod error;
mod extraction;
mod server;

#[derive(Parser, Debug)]
#[command(name = "superdoku-server")]
#[command(about = "Sudoku puzzle photo recognition server")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "SUPERDOKU_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "SUPERDOKU_PORT", default_value = "9000")]
    pub port: u16,

    /// Path to the digit classifier model (downloaded to the cache
    /// directory if not set)
    #[arg(long, env = "SUPERDOKU_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Maximum upload size in bytes (default: 10MB)
    #[arg(long, env = "SUPERDOKU_MAX_FILE_SIZE", default_value = "10485760")]
    pub max_file_size: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Recognize a single image and print the puzzle instead of serving
    #[arg(long, value_name = "IMAGE")]
    pub recognize: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let image = args.recognize.clone();
    let config = config::Config::from(args);

    if let Some(path) = image {
        let classifier = classifiers::rten::RtenClassifier::global(&config)?;
        let extractor = extraction::SudokuExtractor::new(classifier);
        let report = extractor.recognize_path(&path)?;
        println!("Sudoku puzzle ({}ms):\n{}", report.total_time_ms, report.grid);
        println!("{}", report.grid.to_csv());
        return Ok(());
    }

    tracing::info!("Starting superdoku-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
