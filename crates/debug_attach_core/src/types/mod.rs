mod outcome;
mod target;

pub use outcome::WaitOutcome;
pub use target::{DebugTarget, EnvironmentDescriptor, ProjectKind};
