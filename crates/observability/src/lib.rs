//! Tracing and logging (shared setup).

use serde::{Deserialize, Serialize};

/// Output format for process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line, `info` and above.
    #[default]
    Json,
    /// Human-readable lines, `debug` and above.
    Pretty,
}

impl LogFormat {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug { LogFormat::Pretty } else { LogFormat::Json }
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        match self {
            LogFormat::Json => "info",
            LogFormat::Pretty => "debug",
        }
    }
}

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
