use serde::Serialize;
use std::time::Duration;

/// Terminal result of a wait. `Cancelled` is a deliberate user action and never
/// produces an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WaitOutcome {
    Attached { port: u16 },
    Cancelled,
    TimedOut { last_tried_port: u16 },
}

impl WaitOutcome {
    pub fn attached_port(&self) -> Option<u16> {
        match self {
            Self::Attached { port } => Some(*port),
            _ => None,
        }
    }

    /// User-facing message for outcomes that should be reported as a failure.
    pub fn failure_message(&self, host: &str, timeout: Duration) -> Option<String> {
        match self {
            Self::TimedOut { last_tried_port } => Some(format!(
                "Could not attach the debugger to {host}:{last_tried_port}: \
                 no debug agent accepted a connection within {} seconds",
                timeout.as_secs()
            )),
            Self::Attached { .. } | Self::Cancelled => None,
        }
    }
}
