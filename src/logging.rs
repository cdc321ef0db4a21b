//! Logging setup
//!
//! One global subscriber, initialised once from the resolved settings.
//! `RUST_LOG` wins over the configured level when it is set.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

/// Map a configured level name onto a tracing level.
///
/// Accepts the historical spellings `erro`, `fatal` and `panic` as `error`;
/// anything unrecognised is `info`.
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "erro" | "fatal" | "panic" => "error",
        _ => "info",
    }
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{level},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn,redis=warn",
            level = level_directive(level)
        ))
    })
}

/// Install the global subscriber, writing to `log_file` or stdout.
pub fn init(level: &str, log_file: Option<&Path>) {
    let filter = filter_for(level);

    let file = log_file.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| (path.to_path_buf(), e))
    });

    match file {
        Some(Ok(file)) => {
            registry()
                .with(filter)
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .init();
        }
        Some(Err((path, e))) => {
            registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .init();
            warn!(path = %path.display(), error = %e, "Failed to log to file, using stdout");
        }
        None => {
            registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .init();
        }
    }
}
