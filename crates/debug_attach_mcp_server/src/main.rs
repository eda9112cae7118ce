use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use debug_attach_core::{
    ops::{locate, port},
    spawn_attach, AttachConfig, AttachRequest, DebugSessionLauncher, DebugTarget, ProjectKind,
    WaitOutcome,
};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    tool, tool_handler, tool_router, transport, ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ResolvePortParams {
    #[serde(default)]
    start_parameters: String,
    project_kind: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct AttachStartParams {
    #[serde(default)]
    start_parameters: String,
    project_kind: String,
    #[serde(default)]
    server_dir: Option<String>,
    #[serde(default)]
    project_root: Option<String>,
    #[serde(default)]
    host: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct AttemptParams {
    attempt_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AttemptStatus {
    Waiting { initial_port: u16 },
    Attached { host: String, port: u16 },
    Cancelled,
    TimedOut { host: String, port: u16, message: String },
    Failed { message: String },
}

impl AttemptStatus {
    fn is_final(&self) -> bool {
        !matches!(self, Self::Waiting { .. })
    }
}

struct Attempt {
    cancel: CancellationToken,
    status: AttemptStatus,
}

type Attempts = Arc<Mutex<HashMap<u64, Attempt>>>;

/// Publishes the confirmed endpoint so the MCP client can start its own debugger.
struct PublishingLauncher {
    attempts: Attempts,
    attempt_id: u64,
}

#[async_trait::async_trait]
impl DebugSessionLauncher for PublishingLauncher {
    async fn launch(&self, target: &DebugTarget) -> debug_attach_core::Result<()> {
        set_status(
            &self.attempts,
            self.attempt_id,
            AttemptStatus::Attached {
                host: target.host.clone(),
                port: target.port,
            },
        )
        .await;
        Ok(())
    }
}

async fn set_status(attempts: &Attempts, attempt_id: u64, status: AttemptStatus) {
    let mut attempts = attempts.lock().await;
    if let Some(attempt) = attempts.get_mut(&attempt_id) {
        attempt.status = status;
    }
}

fn finished_status(
    outcome: debug_attach_core::Result<WaitOutcome>,
    config: &AttachConfig,
) -> Option<AttemptStatus> {
    match outcome {
        // the launcher already published the endpoint
        Ok(WaitOutcome::Attached { .. }) => None,
        Ok(WaitOutcome::Cancelled) => Some(AttemptStatus::Cancelled),
        Ok(outcome @ WaitOutcome::TimedOut { last_tried_port }) => Some(AttemptStatus::TimedOut {
            host: config.host.clone(),
            port: last_tried_port,
            message: outcome
                .failure_message(&config.host, config.timeout)
                .unwrap_or_default(),
        }),
        Err(e) => Some(AttemptStatus::Failed {
            message: e.to_string(),
        }),
    }
}

/// Explicit server directory, else the one found in the project's default install layout.
async fn server_dir_hint(params: &AttachStartParams, kind: ProjectKind) -> String {
    if let Some(dir) = params.server_dir.as_deref().filter(|d| !d.trim().is_empty()) {
        return dir.to_string();
    }
    let Some(root) = params.project_root.as_deref() else {
        return String::new();
    };
    locate::discover_server_dir(&PathBuf::from(root), kind)
        .await
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parse_kind(value: &str) -> Result<ProjectKind, McpError> {
    ProjectKind::parse(value).ok_or_else(|| {
        McpError::invalid_params(
            format!("Unknown project_kind '{value}', expected 'maven' or 'gradle'"),
            None,
        )
    })
}

fn to_mcp_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

fn unknown_attempt(attempt_id: u64) -> McpError {
    McpError::invalid_params(format!("No attach attempt with id {attempt_id}"), None)
}

#[derive(Clone)]
struct DebugAttachMcpServer {
    tool_router: ToolRouter<Self>,
    attempts: Attempts,
    next_attempt_id: Arc<AtomicU64>,
}

#[tool_router]
impl DebugAttachMcpServer {
    fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
            attempts: Arc::new(Mutex::new(HashMap::new())),
            next_attempt_id: Arc::new(AtomicU64::new(1)),
        }
    }

    #[tool(description = "Resolve the JVM debug port a dev-mode server will be asked to use")]
    async fn debug_resolve_port(
        &self,
        params: Parameters<ResolvePortParams>,
    ) -> Result<CallToolResult, McpError> {
        let kind = parse_kind(&params.0.project_kind)?;
        let port = port::resolve(&params.0.start_parameters, kind)
            .map_err(|e| to_mcp_error(format!("Port resolution failed: {e}")))?;

        Ok(CallToolResult::structured(json!({ "port": port })))
    }

    #[tool(description = "Start waiting in the background for a dev-mode server's debug agent")]
    async fn debug_attach_start(
        &self,
        params: Parameters<AttachStartParams>,
    ) -> Result<CallToolResult, McpError> {
        let kind = parse_kind(&params.0.project_kind)?;
        let server_dir = server_dir_hint(&params.0, kind).await;
        let request = AttachRequest::resolve(&params.0.start_parameters, kind, server_dir.clone())
            .map_err(|e| to_mcp_error(format!("Debug attach failed: {e}")))?;

        let mut config = AttachConfig::from_env();
        if let Some(host) = params.0.host.as_deref().filter(|h| !h.trim().is_empty()) {
            config = config.with_host(host);
        }

        let attempt_id = self.next_attempt_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.attempts.lock().await.insert(
            attempt_id,
            Attempt {
                cancel: cancel.clone(),
                status: AttemptStatus::Waiting {
                    initial_port: request.initial_port,
                },
            },
        );

        let launcher = Arc::new(PublishingLauncher {
            attempts: self.attempts.clone(),
            attempt_id,
        });
        let initial_port = request.initial_port;
        let handle = spawn_attach(config.clone(), request, launcher, cancel);

        let attempts = self.attempts.clone();
        tokio::spawn(async move {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    set_status(
                        &attempts,
                        attempt_id,
                        AttemptStatus::Failed {
                            message: format!("Attach task aborted: {e}"),
                        },
                    )
                    .await;
                    return;
                }
            };
            if let Some(status) = finished_status(outcome, &config) {
                set_status(&attempts, attempt_id, status).await;
            }
        });

        tracing::info!(
            "Started attach attempt {} on port {} (server dir: '{}')",
            attempt_id,
            initial_port,
            server_dir
        );

        Ok(CallToolResult::structured(json!({
            "attempt_id": attempt_id,
            "initial_port": initial_port,
            "server_dir": server_dir,
        })))
    }

    #[tool(description = "Report the state of a debug attach attempt")]
    async fn debug_attach_status(
        &self,
        params: Parameters<AttemptParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut attempts = self.attempts.lock().await;
        let attempt = attempts
            .get(&params.0.attempt_id)
            .ok_or_else(|| unknown_attempt(params.0.attempt_id))?;

        let status = serde_json::to_value(&attempt.status)
            .map_err(|e| to_mcp_error(format!("Failed to encode attempt status: {e}")))?;
        // a final status is reported once, then forgotten
        if attempt.status.is_final() {
            attempts.remove(&params.0.attempt_id);
        }
        Ok(CallToolResult::structured(status))
    }

    #[tool(description = "Cancel a pending debug attach attempt")]
    async fn debug_attach_cancel(
        &self,
        params: Parameters<AttemptParams>,
    ) -> Result<CallToolResult, McpError> {
        let attempts = self.attempts.lock().await;
        let attempt = attempts
            .get(&params.0.attempt_id)
            .ok_or_else(|| unknown_attempt(params.0.attempt_id))?;

        attempt.cancel.cancel();
        let pending = !attempt.status.is_final();

        Ok(CallToolResult::structured(json!({
            "attempt_id": params.0.attempt_id,
            "cancelled": pending,
        })))
    }
}

#[tool_handler]
impl ServerHandler for DebugAttachMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Locates and waits for the JDWP debug port of a local dev-mode server".into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let server = DebugAttachMcpServer::new();
    let transport = transport::stdio();

    tracing::info!("Starting Debug Attach MCP Server on stdio...");

    server.serve(transport).await?.waiting().await?;

    Ok(())
}
