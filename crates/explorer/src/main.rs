use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use explorer::{ExplorerConfig, ExplorerState};

/// Initialise the tracing / logging subsystem.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "explorer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        eprintln!("usage: explorer <export-file>...");
        std::process::exit(2);
    }

    let config = match ExplorerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(2);
        }
    };

    let state = ExplorerState::start(config);
    for path in paths {
        state.load_path(path);
    }
    state.wait_idle().await;

    if let Some(err) = state.last_error().await {
        error!("worker fault: {}", err);
    }

    let summary = state.summary().await;
    info!(
        "{} records across {} files, {} parse errors",
        summary.total_records, summary.file_count, summary.total_parse_errors
    );

    let report = serde_json::json!({
        "summary": summary,
        "files": state.files().await,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            error!("failed to render report: {}", e);
            std::process::exit(1);
        }
    }
}
