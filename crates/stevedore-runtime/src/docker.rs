use crate::backend::{ContainerBackend, ContainerSpec};
use crate::RuntimeError;
use std::process::Command;
use tracing::debug;

/// Container backend driving the `docker` CLI, or `podman` when docker is
/// not installed.
pub struct DockerBackend {
    network: Option<String>,
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerBackend {
    pub fn new() -> Self {
        Self { network: None }
    }

    /// Attach containers to a user-defined network so `--ip` can be honoured.
    #[must_use]
    pub fn with_network(mut self, network: &str) -> Self {
        self.network = Some(network.to_owned());
        self
    }

    fn find_cli() -> Option<String> {
        for candidate in &["docker", "podman"] {
            if let Ok(output) = Command::new(candidate).arg("--version").output() {
                if output.status.success() {
                    return Some((*candidate).to_owned());
                }
            }
        }
        None
    }

    fn cli() -> Result<String, RuntimeError> {
        Self::find_cli().ok_or_else(|| {
            RuntimeError::BackendUnavailable("no container CLI found (docker/podman)".to_owned())
        })
    }

    fn run_args(&self, spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_owned(),
            "--detach".to_owned(),
            "--name".to_owned(),
            spec.name.clone(),
            "--hostname".to_owned(),
            spec.hostname.clone(),
            "--label".to_owned(),
            "stevedore.managed=1".to_owned(),
        ];
        if let Some(network) = &self.network {
            args.push("--network".to_owned());
            args.push(network.clone());
            if let Some(ip) = &spec.ip {
                args.push("--ip".to_owned());
                args.push(ip.clone());
            }
        }
        for (k, v) in &spec.env {
            args.push("--env".to_owned());
            args.push(format!("{k}={v}"));
        }
        args.push(spec.image.clone());
        args
    }
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no container with name")
}

impl ContainerBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        Self::find_cli().is_some()
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        let cli = Self::cli()?;
        let args = self.run_args(spec);
        debug!("{cli} {}", args.join(" "));
        let output = Command::new(&cli)
            .args(&args)
            .output()
            .map_err(|e| RuntimeError::ExecFailed(format!("{cli} run failed: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::ExecFailed(format!(
                "{cli} run {} exited with code {}: {}",
                spec.name,
                output.status.code().unwrap_or(1),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        let cli = Self::cli()?;
        debug!("{cli} rm --force {name}");
        let output = Command::new(&cli)
            .args(["rm", "--force", name])
            .output()
            .map_err(|e| RuntimeError::ExecFailed(format!("{cli} rm failed: {e}")))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing_container(&stderr) {
            Err(RuntimeError::ContainerNotFound(name.to_owned()))
        } else {
            Err(RuntimeError::ExecFailed(format!(
                "{cli} rm {name}: {}",
                stderr.trim()
            )))
        }
    }
}
