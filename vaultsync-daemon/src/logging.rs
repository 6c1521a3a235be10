//! Daemon log output: stdout plus `daemon.log`, with warnings and errors
//! also copied to `daemon-err.log`.
//!
//! `RUST_LOG` filters as usual (default `info`). Setting
//! `VAULTSYNC_LOG_FORMAT=json` switches stdout to JSON lines.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::paths::{stderr_log_path, stdout_log_path};

/// Appends to a log file, reopening it for every event so a rotated file is
/// picked up without coordination.
#[derive(Debug, Clone)]
pub struct AppendFile {
    path: PathBuf,
}

impl AppendFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl<'a> MakeWriter<'a> for AppendFile {
    type Writer = Box<dyn Write + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::sink()),
        }
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(home: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("VAULTSYNC_LOG_FORMAT").is_ok_and(|format| format == "json");

    let stdout_layer = if json {
        fmt::layer().json().with_target(false).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(AppendFile::new(stdout_log_path(home)));
    let err_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(AppendFile::new(stderr_log_path(home)))
        .with_filter(LevelFilter::WARN);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(err_layer)
        .try_init();
}
