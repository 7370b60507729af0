//! Docker API wrapper using the bollard crate.
//!
//! [`ContainerEngine`] is the narrow surface the run lifecycle needs from a
//! container engine; [`DockerClient`] implements it against the local
//! Docker daemon.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{HostConfig, Mount, MountTypeEnum, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures::StreamExt;

use crate::error::RunError;
use crate::execution::resources::ContainerSpec;

/// A locally available image as returned by a reference lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub id: String,
    pub labels: HashMap<String, String>,
}

/// Result of a successful container creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContainer {
    pub id: String,
    /// Non-fatal warnings reported by the engine.
    pub warnings: Vec<String>,
}

/// Container engine operations used by a run.
///
/// Every method maps engine failures onto the [`RunError`] variant of the
/// lifecycle stage it belongs to. Nothing is retried.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Liveness probe. Returns the engine API version.
    async fn ping(&self) -> Result<String, RunError>;

    /// Pulls `reference`, logging progress as it streams in.
    async fn pull_image(&self, reference: &str) -> Result<(), RunError>;

    /// Lists local images exactly matching `reference`.
    async fn find_images(&self, reference: &str) -> Result<Vec<ImageInfo>, RunError>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<CreatedContainer, RunError>;

    async fn start_container(&self, id: &str) -> Result<(), RunError>;

    /// Opens a combined stdin/stdout/stderr stream, replaying existing logs first.
    async fn attach_container(&self, id: &str) -> Result<AttachContainerResults, RunError>;

    /// Forced removal of a container.
    async fn remove_container(&self, id: &str) -> Result<(), RunError>;
}

/// Builds the bollard create payload for `spec`.
pub fn container_config(spec: &ContainerSpec) -> Config<String> {
    let mounts = spec.bind.as_ref().map(|bind| {
        vec![Mount {
            typ: Some(MountTypeEnum::BIND),
            source: Some(bind.source.to_string_lossy().into_owned()),
            target: Some(bind.target.clone()),
            read_only: Some(false),
            ..Default::default()
        }]
    });

    let host_config = HostConfig {
        network_mode: Some("host".to_string()),
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            maximum_retry_count: None,
        }),
        auto_remove: Some(true),
        oom_score_adj: Some(spec.limits.oom_score_adj),
        privileged: Some(false),
        readonly_rootfs: Some(false),
        memory: Some(spec.limits.memory_bytes),
        memory_reservation: Some(spec.limits.memory_bytes),
        oom_kill_disable: Some(false),
        pids_limit: Some(spec.limits.max_processes),
        mounts,
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: (!spec.args.is_empty()).then(|| spec.args.clone()),
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        open_stdin: Some(true),
        stdin_once: Some(true),
        network_disabled: Some(false),
        stop_timeout: Some(spec.stop_timeout_secs),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a new Docker client using the local defaults (`DOCKER_HOST` or the local socket).
    ///
    /// # Errors
    ///
    /// Returns `RunError::EngineUnavailable` if the client cannot be configured.
    pub fn new() -> Result<Self, RunError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RunError::EngineUnavailable(format!("failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerEngine for DockerClient {
    async fn ping(&self) -> Result<String, RunError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RunError::EngineUnavailable(format!("ping failed: {e}")))?;

        let version = self
            .docker
            .version()
            .await
            .map_err(|e| RunError::EngineUnavailable(format!("version query failed: {e}")))?;

        Ok(version.api_version.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn pull_image(&self, reference: &str) -> Result<(), RunError> {
        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| RunError::Pull {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

            if let Some(error) = info.error {
                return Err(RunError::Pull {
                    reference: reference.to_string(),
                    message: error,
                });
            }

            let status = info.status.unwrap_or_default();
            let progress = info.progress.unwrap_or_default();
            match info.id {
                Some(id) => tracing::info!("{id}: {status} {progress}"),
                None => tracing::info!("{status} {progress}"),
            }
        }

        Ok(())
    }

    async fn find_images(&self, reference: &str) -> Result<Vec<ImageInfo>, RunError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![reference.to_string()]);

        let options = ListImagesOptions::<String> {
            filters,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| RunError::EngineUnavailable(format!("image lookup failed: {e}")))?;

        Ok(summaries
            .into_iter()
            .map(|summary| ImageInfo {
                id: summary.id,
                labels: summary.labels,
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<CreatedContainer, RunError> {
        let response = self
            .docker
            .create_container(
                None::<CreateContainerOptions<String>>,
                container_config(spec),
            )
            .await
            .map_err(|e| RunError::Create(e.to_string()))?;

        Ok(CreatedContainer {
            id: response.id,
            warnings: response.warnings,
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), RunError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RunError::Start {
                id: id.to_string(),
                message: e.to_string(),
            })
    }

    async fn attach_container(&self, id: &str) -> Result<AttachContainerResults, RunError> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            detach_keys: None,
        };

        self.docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| RunError::Attach {
                id: id.to_string(),
                message: e.to_string(),
            })
    }

    async fn remove_container(&self, id: &str) -> Result<(), RunError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| RunError::Remove {
                id: id.to_string(),
                message: e.to_string(),
            })
    }
}
