use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttachError {
    #[error("Failed to allocate an ephemeral debug port: {0}")]
    PortAllocation(#[from] std::io::Error),

    #[error("Debugger launch failed: {0}")]
    Launch(String),

    #[error("Invalid debug port: {0}")]
    InvalidPort(String),
}

impl AttachError {
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch(message.into())
    }
}
