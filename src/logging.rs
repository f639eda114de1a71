//! Structured logging utilities for kitrun
//!
//! All pipeline logs use structured fields so a run can be followed per script.
//!
//! # Log Format Conventions
//!
//! - `script`: Script identity (file name without extension)
//! - `operation`: The pipeline step ("compile", "eval", "load", "save", "release")
//! - `status`: The outcome ("success", "hit", "stale", "mismatch", "error")
//! - `content_digest`: Digest of the source text (hex-encoded)
//! - `size_bytes`: Artifact size in bytes
//!
//! # Examples
//!
//! ```rust
//! use tracing::info;
//!
//! info!(
//!     script = "hello",
//!     operation = "load",
//!     status = "hit",
//!     "cache record matches source"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{
    fmt::{self, format::Writer},
    prelude::*,
    EnvFilter,
};

/// Formatter that shows "kitrun" instead of the full module path
struct KitFormatter {
    with_ansi: bool,
}

impl<S, N> FormatEvent<S, N> for KitFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let meta = event.metadata();

        write!(
            writer,
            "{} ",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6fZ")
        )?;

        if self.with_ansi {
            let level_style = match *meta.level() {
                tracing::Level::ERROR => "\x1b[31m", // Red
                tracing::Level::WARN => "\x1b[33m",  // Yellow
                tracing::Level::INFO => "\x1b[32m",  // Green
                tracing::Level::DEBUG => "\x1b[34m", // Blue
                tracing::Level::TRACE => "\x1b[35m", // Magenta
            };
            write!(writer, "{}{:5}(kitrun)\x1b[0m: ", level_style, meta.level())?;
        } else {
            write!(writer, "{:5}(kitrun): ", meta.level())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format (default for interactive use)
    Pretty,
    /// Compact format without colors (CI)
    Compact,
    /// JSON format (for log aggregation systems)
    Json,
}

impl LogFormat {
    /// Parse a format name; unknown names yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    /// Parse from environment variable (KIT_LOG_FORMAT)
    pub fn from_env() -> Self {
        std::env::var("KIT_LOG_FORMAT")
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_else(|| {
                if std::env::var("CI").is_ok() {
                    Self::Compact
                } else {
                    Self::Pretty
                }
            })
    }
}

/// Initialize the global tracing subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "debug", "info", "warn"), "info" by default
/// - `KIT_LOG_FORMAT`: Set format ("pretty", "compact", "json")
/// - `CI`: If set, defaults to compact format
///
/// Calling it twice is harmless; the second subscriber is ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match LogFormat::from_env() {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(KitFormatter { with_ansi: true })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .event_format(KitFormatter { with_ansi: false })
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("kitrun: logging already initialized: {}", e);
    }
}

/// Standard field names for consistent logging
#[allow(dead_code)]
pub mod fields {
    /// Script identity
    pub const SCRIPT: &str = "script";
    /// Pipeline step (e.g., "compile", "eval")
    pub const OPERATION: &str = "operation";
    /// Outcome (e.g., "success", "hit", "error")
    pub const STATUS: &str = "status";
    /// Digest of the source text
    pub const CONTENT_DIGEST: &str = "content_digest";
    /// Digest of the parameter signature
    pub const PARAMETER_DIGEST: &str = "parameter_digest";
    /// Artifact size in bytes
    pub const SIZE_BYTES: &str = "size_bytes";
    /// Wall time of the step
    pub const ELAPSED_MS: &str = "elapsed_ms";
}

/// Operation names for consistent logging
#[allow(dead_code)]
pub mod operations {
    pub const COMPILE: &str = "compile";
    pub const SAVE: &str = "save";
    pub const LOAD: &str = "load";
    pub const EVAL: &str = "eval";
    pub const RELEASE: &str = "release";
}

/// Status values for consistent logging
#[allow(dead_code)]
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const STALE: &str = "stale";
    pub const MISMATCH: &str = "mismatch";
    pub const REJECTED: &str = "rejected";
    pub const ERROR: &str = "error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("loud"), None);
    }
}
