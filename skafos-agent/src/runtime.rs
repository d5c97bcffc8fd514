//! The container/network collaborator the agent drives to stand up a
//! sidecar proxy. Kept behind a trait since the implementation shells out
//! to the Docker daemon and an external iptables script, and that
//! boundary is exactly where a test double or an alternate runtime
//! belongs.

use async_trait::async_trait;

use crate::error::AgentError;

/// Node-local operations needed to wire a sidecar proxy into a pod's
/// network namespace.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates (but does not start) a sidecar proxy container sharing the
    /// network namespace of `sandbox_name`. Returns the new container's id.
    async fn create_sidecar(&self, sandbox_name: &str) -> Result<String, AgentError>;

    /// Starts a previously created sidecar container.
    async fn start_sidecar(&self, container_id: &str) -> Result<(), AgentError>;

    /// Installs the redirect rules (iptables) that route the sandbox's
    /// inbound traffic through the sidecar proxy.
    async fn install_redirect(&self, sandbox_name: &str) -> Result<(), AgentError>;

    /// Returns `Ok(())` if the sandbox still exists, `Err` otherwise. Used
    /// by the dead-proxy reaper.
    async fn inspect_sandbox(&self, sandbox_name: &str) -> Result<(), AgentError>;

    /// Stops and removes a sidecar container.
    async fn remove_sidecar(&self, container_id: &str) -> Result<(), AgentError>;
}

/// Default runtime: shells out to an external `skafos-redirect.sh` script
/// for iptables setup and to a pluggable container CLI (`docker` by
/// default) for container lifecycle.
pub struct ShellRuntime {
    container_cli: String,
    redirect_script_path: String,
    proxy_image: String,
}

impl ShellRuntime {
    pub fn new(container_cli: impl Into<String>, redirect_script_path: impl Into<String>, proxy_image: impl Into<String>) -> Self {
        Self {
            container_cli: container_cli.into(),
            redirect_script_path: redirect_script_path.into(),
            proxy_image: proxy_image.into(),
        }
    }

    fn proxy_container_name(sandbox_name: &str) -> String {
        format!("skproxy_{sandbox_name}")
    }
}

#[async_trait]
impl ContainerRuntime for ShellRuntime {
    async fn create_sidecar(&self, sandbox_name: &str) -> Result<String, AgentError> {
        let name = Self::proxy_container_name(sandbox_name);
        let output = tokio::process::Command::new(&self.container_cli)
            .args([
                "create",
                "--network",
                &format!("container:{sandbox_name}"),
                "--user",
                "1234",
                "--name",
                &name,
                &self.proxy_image,
            ])
            .output()
            .await
            .map_err(|e| AgentError::CreateSidecar(e.to_string()))?;

        if !output.status.success() {
            return Err(AgentError::CreateSidecar(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn start_sidecar(&self, container_id: &str) -> Result<(), AgentError> {
        let output = tokio::process::Command::new(&self.container_cli)
            .args(["start", container_id])
            .output()
            .await
            .map_err(|e| AgentError::StartSidecar(e.to_string()))?;
        if !output.status.success() {
            return Err(AgentError::StartSidecar(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }

    async fn install_redirect(&self, sandbox_name: &str) -> Result<(), AgentError> {
        let output = tokio::process::Command::new(&self.redirect_script_path)
            .arg(sandbox_name)
            .output()
            .await
            .map_err(|e| AgentError::InstallRedirect(e.to_string()))?;
        if !output.status.success() {
            return Err(AgentError::InstallRedirect(String::from_utf8_lossy(&output.stderr).into_owned()));
        }
        Ok(())
    }

    async fn inspect_sandbox(&self, sandbox_name: &str) -> Result<(), AgentError> {
        let output = tokio::process::Command::new(&self.container_cli)
            .args(["inspect", sandbox_name])
            .output()
            .await
            .map_err(|_| AgentError::SandboxNotFound(sandbox_name.to_string()))?;
        if !output.status.success() {
            return Err(AgentError::SandboxNotFound(sandbox_name.to_string()));
        }
        Ok(())
    }

    async fn remove_sidecar(&self, container_id: &str) -> Result<(), AgentError> {
        let _ = tokio::process::Command::new(&self.container_cli).args(["stop", container_id]).output().await;
        let _ = tokio::process::Command::new(&self.container_cli).args(["rm", container_id]).output().await;
        Ok(())
    }
}
