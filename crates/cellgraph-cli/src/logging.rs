//! Subscriber setup: console output plus an optional per-run log file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str =
    "cellgraph_cli=info,cellgraph_pipeline=info,cellgraph_retrieval=info,cellgraph_metric=info";

/// `<dir>/<YYYY-MM-DD_HH-MM-SS>.log` for the current local time.
pub fn log_file_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "{}.log",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    ))
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// With `log_dir`, events are also appended to a fresh file there, whose path
/// is returned.
pub fn init(log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter())
            .with(console)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = log_file_path(dir);
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    tracing_subscriber::registry()
        .with(filter())
        .with(console)
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        .init();
    Ok(Some(path))
}
