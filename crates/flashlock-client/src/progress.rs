//! Progress reporting.
//!
//! The agent and the tool supervisor emit events into a sink the caller
//! supplies. Producers make no assumption about which thread consumes
//! the events; a UI embedding this crate marshals on its side of the
//! sink.

/// Where a flash currently stands. `Fetching`/`Decrypted` carry the
/// zero-based index into the session's artifact manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashPhase {
    SessionRequested,
    SessionEstablished,
    Fetching(usize),
    Decrypted(usize),
    ToolRunning,
    Reporting,
    Done,
    Aborted,
}

impl std::fmt::Display for FlashPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlashPhase::SessionRequested => write!(f, "requesting session"),
            FlashPhase::SessionEstablished => write!(f, "session established"),
            FlashPhase::Fetching(i) => write!(f, "fetching artifact {}", i + 1),
            FlashPhase::Decrypted(i) => write!(f, "decrypted artifact {}", i + 1),
            FlashPhase::ToolRunning => write!(f, "flash tool running"),
            FlashPhase::Reporting => write!(f, "reporting outcome"),
            FlashPhase::Done => write!(f, "done"),
            FlashPhase::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase(FlashPhase),
    /// One line of flash-tool output (stdout or stderr).
    ToolOutput(String),
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Prints phases and tool output to stderr. Used by the CLI binary.
pub struct StderrSink;

impl ProgressSink for StderrSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase(phase) => eprintln!("[flash] {phase}"),
            ProgressEvent::ToolOutput(line) => eprintln!("[tool] {line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display_is_human_readable() {
        assert_eq!(format!("{}", FlashPhase::Fetching(0)), "fetching artifact 1");
        assert_eq!(format!("{}", FlashPhase::Decrypted(1)), "decrypted artifact 2");
        assert_eq!(format!("{}", FlashPhase::Done), "done");
    }
}
