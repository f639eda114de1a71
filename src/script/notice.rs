//! Operator-facing notices
//!
//! The pipeline reports progress and user-facing outcomes as [`Notice`]
//! values. Where they end up (the console, the log, a test buffer) is up to
//! the [`NoticeSink`] the caller supplies.
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli_utils::{format_elapsed, kitrun_prefix};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Compiling { id: String },
    Compiled { id: String, elapsed: Duration },
    Evaluated { id: String },
    AlreadyRunning { id: String },
    ParameterMismatch {
        id: String,
        expected_count: u32,
        description: String,
    },
    Report { id: String, message: String },
    Released { id: String, failures: usize },
}

impl Notice {
    pub fn id(&self) -> &str {
        match self {
            Notice::Compiling { id }
            | Notice::Compiled { id, .. }
            | Notice::Evaluated { id }
            | Notice::AlreadyRunning { id }
            | Notice::ParameterMismatch { id, .. }
            | Notice::Report { id, .. }
            | Notice::Released { id, .. } => id,
        }
    }

    /// Progress notices are dropped when a request runs with logging off
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            Notice::Compiling { .. } | Notice::Compiled { .. } | Notice::Evaluated { .. }
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Compiling { id } => write!(f, "Compiling {}...", id),
            Notice::Compiled { id, elapsed } => {
                write!(f, "Compiled {} in {}", id, format_elapsed(*elapsed))
            }
            Notice::Evaluated { id } => write!(f, "Evaluated {}", id),
            Notice::AlreadyRunning { id } => {
                write!(f, "{} is already running, release it first", id)
            }
            Notice::ParameterMismatch {
                id,
                expected_count,
                description,
            } => write!(
                f,
                "{} was compiled for {} parameter(s) ({}); recompile it to use the current ones",
                id, expected_count, description
            ),
            Notice::Report { id, message } => write!(f, "{}: {}", id, message),
            Notice::Released { id, failures: 0 } => write!(f, "Released {}", id),
            Notice::Released { id, failures } => {
                write!(f, "Released {} ({} cleanup(s) failed)", id, failures)
            }
        }
    }
}

/// Receives notices for one or more requests
pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to stderr with the `[kitrun]` prefix
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl NoticeSink for ConsoleSink {
    fn notify(&self, notice: Notice) {
        eprintln!("{} {}", kitrun_prefix(), notice);
    }
}

/// Forwards notices to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NoticeSink for TracingSink {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::Report { .. } | Notice::ParameterMismatch { .. } => {
                warn!(script = %notice.id(), "{}", notice)
            }
            _ => info!(script = %notice.id(), "{}", notice),
        }
    }
}

/// Keeps every notice in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    notices: Mutex<Vec<Notice>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl NoticeSink for CollectingSink {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notice);
    }
}
