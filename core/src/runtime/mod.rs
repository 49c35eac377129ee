//! The scheduler, the capability surface handed to cells, and the threaded runtime.

use super::*;

use crate::{config::ConfigError, graph::GraphError};
use once_cell::sync::Lazy;
use std::{
    error,
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

mod config;
mod dispatch;
mod lifecycle;
mod queues;
mod scheduler;
mod system;
mod tx;

pub use config::*;
pub use scheduler::*;
pub use system::*;
pub use tx::*;

static GLOBAL_RUNTIME_COUNT: AtomicUsize = AtomicUsize::new(0);

fn default_runtime_label() -> String {
    let runtime_count = GLOBAL_RUNTIME_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
    format!("cellflow-runtime-{}", runtime_count)
}

static DEFAULT_ROOT_LOGGER: Lazy<CellflowLogger> = Lazy::new(|| {
    let decorator = slog_term::TermDecorator::new().stdout().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).chan_size(1024).build().fuse();
    slog::Logger::root_typed(
        Arc::new(drain),
        o!(
        "location" => slog::PushFnValue(|r: &slog::Record<'_>, ser: slog::PushFnValueSerializer<'_>| {
            ser.emit(format_args!("{}:{}", r.file(), r.line()))
        })
                ),
    )
});

/// The process-wide default root logger.
///
/// Created on first use, writing asynchronously to stdout.
pub fn default_logger() -> &'static CellflowLogger {
    &DEFAULT_ROOT_LOGGER
}

/// Errors of the threaded [Runtime].
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// `start` was called on a running runtime.
    AlreadyRunning,
    /// The operation needs a running runtime.
    NotRunning,
    /// The declarations do not form a graph.
    Build(GraphError),
    /// The configuration is invalid.
    Config(ConfigError),
    /// The scheduler thread went away unexpectedly.
    Disconnected,
    /// The scheduler thread panicked.
    ThreadPanicked,
}

impl From<GraphError> for RuntimeError {
    fn from(e: GraphError) -> Self {
        RuntimeError::Build(e)
    }
}

impl From<ConfigError> for RuntimeError {
    fn from(e: ConfigError) -> Self {
        RuntimeError::Config(e)
    }
}

impl From<hocon::Error> for RuntimeError {
    fn from(e: hocon::Error) -> Self {
        RuntimeError::Config(e.into())
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::AlreadyRunning => write!(f, "The runtime is already running."),
            RuntimeError::NotRunning => write!(f, "The runtime is not running."),
            RuntimeError::Build(e) => write!(f, "Could not build the graph: {}", e),
            RuntimeError::Config(e) => write!(f, "Invalid configuration: {}", e),
            RuntimeError::Disconnected => write!(f, "The scheduler thread is gone."),
            RuntimeError::ThreadPanicked => write!(f, "The scheduler thread panicked."),
        }
    }
}

impl error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RuntimeError::Build(e) => Some(e),
            RuntimeError::Config(e) => Some(e),
            _ => None,
        }
    }
}
