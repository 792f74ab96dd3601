//! Human-readable progress reporting.

/// Severity of a progress message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for ProgressLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

/// Receives progress messages from the orchestrator.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, level: ProgressLevel, message: &str);
}

/// Forwards progress to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn notify(&self, level: ProgressLevel, message: &str) {
        match level {
            ProgressLevel::Info => tracing::info!(target: "vaultsync::progress", "{message}"),
            ProgressLevel::Warn => tracing::warn!(target: "vaultsync::progress", "{message}"),
            ProgressLevel::Error => tracing::error!(target: "vaultsync::progress", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_display() {
        assert_eq!(ProgressLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn tracing_sink_accepts_all_levels() {
        let sink = TracingProgressSink;
        sink.notify(ProgressLevel::Info, "starting");
        sink.notify(ProgressLevel::Warn, "careful");
        sink.notify(ProgressLevel::Error, "failed");
    }
}
