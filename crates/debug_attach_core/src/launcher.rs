use crate::ops::port;
use crate::{AttachConfig, AttachWaiter, DebugTarget, ProjectKind, Result, WaitOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Hands a confirmed endpoint to whatever actually runs the debugger session.
#[async_trait]
pub trait DebugSessionLauncher: Send + Sync {
    async fn launch(&self, target: &DebugTarget) -> Result<()>;
}

/// One debug-attach attempt with its initial port already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub initial_port: u16,
    pub server_dir_hint: String,
}

impl AttachRequest {
    /// Resolves the initial port from the start parameters. Failing to allocate an
    /// ephemeral port is fatal and is returned before any waiting happens.
    pub fn resolve(
        start_parameters: &str,
        kind: ProjectKind,
        server_dir_hint: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            initial_port: port::resolve(start_parameters, kind)?,
            server_dir_hint: server_dir_hint.into(),
        })
    }
}

/// Waits for the debug agent and launches the session only once it is attached.
pub async fn attach_debugger<L>(
    config: AttachConfig,
    request: &AttachRequest,
    launcher: &L,
    cancel: &CancellationToken,
) -> Result<WaitOutcome>
where
    L: DebugSessionLauncher + ?Sized,
{
    let host = config.host.clone();
    let waiter = AttachWaiter::new(config);
    let outcome = waiter
        .wait(cancel, request.initial_port, &request.server_dir_hint)
        .await;

    if let Some(port) = outcome.attached_port() {
        launcher.launch(&DebugTarget::new(host, port)).await?;
    }

    Ok(outcome)
}

/// Runs [`attach_debugger`] on its own background task.
pub fn spawn_attach(
    config: AttachConfig,
    request: AttachRequest,
    launcher: Arc<dyn DebugSessionLauncher>,
    cancel: CancellationToken,
) -> JoinHandle<Result<WaitOutcome>> {
    tokio::spawn(async move { attach_debugger(config, &request, launcher.as_ref(), &cancel).await })
}
