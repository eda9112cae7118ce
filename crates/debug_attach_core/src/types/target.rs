use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DebugTarget {
    pub host: String,
    pub port: u16,
}

impl DebugTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DebugTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Build tool that launched the dev-mode server. Each one spells the debug port
/// flag differently and lays the server out under a different build directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    Maven,
    Gradle,
}

impl ProjectKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "maven" | "mvn" => Some(Self::Maven),
            "gradle" => Some(Self::Gradle),
            _ => None,
        }
    }
}

/// What one poll iteration saw of the server's environment descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub path: PathBuf,
    pub exists_at_poll_start: bool,
    pub backup_exists: bool,
}
