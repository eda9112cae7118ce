//! Debug Attach Core
//!
//! Locates the JDWP debug port of a locally running dev-mode server, waits for the
//! debug agent to accept connections and hands the confirmed endpoint to a debugger
//! launcher. The port may be reassigned by the server after start, so the waiter keeps
//! re-reading the server's environment descriptor while it polls.

pub mod config;
pub mod error;
pub mod launcher;
pub mod ops;
pub mod types;
pub mod waiter;

// Re-export commonly used types
pub use config::AttachConfig;
pub use error::AttachError;
pub use launcher::{attach_debugger, spawn_attach, AttachRequest, DebugSessionLauncher};
pub use types::{DebugTarget, EnvironmentDescriptor, ProjectKind, WaitOutcome};
pub use waiter::AttachWaiter;

/// Result type alias using AttachError
pub type Result<T> = std::result::Result<T, AttachError>;
