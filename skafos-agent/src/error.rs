use thiserror::Error;

/// Infrastructure failures the agent can hit while setting up or tearing
/// down a sidecar proxy. Rule-push failures are logged and swallowed at
/// the call site (see `skafos_agent::client`), not represented here.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to create sidecar container: {0}")]
    CreateSidecar(String),

    #[error("failed to start sidecar container: {0}")]
    StartSidecar(String),

    #[error("failed to install redirect rules: {0}")]
    InstallRedirect(String),

    #[error("failed to inspect sandbox {0}")]
    SandboxNotFound(String),
}
