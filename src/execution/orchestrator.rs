//! Run lifecycle: from engine connection to guaranteed container removal.
//!
//! ```text
//! Connecting → Pulling? → ImageResolving → Configuring → Creating
//!            → Starting → Attaching → Running → Cleaning → Done
//! ```
//!
//! Once a container exists, every path out of the lifecycle goes through
//! `Cleaning`. While `Running`, three events race: the run deadline, the
//! attach stream closing and process-wide cancellation. The first one ends
//! the run; only cancellation turns into an error.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Instant;

use crate::error::RunError;
use crate::execution::attach::{AttachBridge, AttachIo};
use crate::execution::container::ContainerGuard;
use crate::execution::docker_client::ContainerEngine;
use crate::execution::lock::InstanceLock;
use crate::execution::resources::ContainerSpec;
use crate::execution::signal::Shutdown;
use crate::options::{is_remote_reference, normalize_reference, RunConfig, RunDefaults};
use crate::units::format_bytes_iec;

/// Lifecycle stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Connecting,
    Pulling,
    ImageResolving,
    Configuring,
    Creating,
    Starting,
    Attaching,
    Running,
    Cleaning,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Connecting => "connecting",
            RunState::Pulling => "pulling",
            RunState::ImageResolving => "resolving image",
            RunState::Configuring => "configuring",
            RunState::Creating => "creating",
            RunState::Starting => "starting",
            RunState::Attaching => "attaching",
            RunState::Running => "running",
            RunState::Cleaning => "cleaning",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

/// What ended the `Running` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    TimeoutExpired,
    StreamClosed,
    ExternalInterrupt,
    UpstreamContextCancelled,
}

/// Input for one run, as collected from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Image reference; `:latest` is implied when untagged.
    pub image: String,
    /// Prefix of image labels that override `defaults`.
    pub label_prefix: String,
    pub defaults: RunDefaults,
}

impl RunRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            label_prefix: crate::options::DEFAULT_LABEL_PREFIX.to_string(),
            defaults: RunDefaults::default(),
        }
    }

    /// Rejects requests that cannot succeed, before the engine is contacted.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.image.trim().is_empty() {
            return Err(RunError::config("image name not specified"));
        }
        self.defaults.validate()
    }
}

/// Drives a single container run against a [`ContainerEngine`].
pub struct RunOrchestrator {
    engine: Arc<dyn ContainerEngine>,
    lock_path: Option<PathBuf>,
    workdir: Option<PathBuf>,
}

impl RunOrchestrator {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            lock_path: None,
            workdir: None,
        }
    }

    /// File locked when concurrent execution is disabled. Defaults to the current executable.
    pub fn with_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    /// Host directory bind-mounted into the container. Defaults to the current directory.
    pub fn with_workdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workdir = Some(path.into());
        self
    }

    /// Runs the full lifecycle.
    ///
    /// Returns `Ok(())` when the run ended through its timeout or the
    /// container's streams closing, the first fatal error otherwise.
    /// Cancellation through `shutdown` yields [`Shutdown::termination_error`].
    pub async fn run(
        &self,
        request: RunRequest,
        io: AttachIo,
        shutdown: &Shutdown,
    ) -> Result<(), RunError> {
        request.validate()?;
        let reference = normalize_reference(&request.image);

        enter(RunState::Connecting);
        let api_version = until_cancelled(shutdown, self.engine.ping()).await?;
        tracing::debug!(api_version = %api_version, "connected to container engine");

        if is_remote_reference(&reference) {
            enter(RunState::Pulling);
            tracing::debug!(image = %reference, "pulling image");
            until_cancelled(shutdown, self.engine.pull_image(&reference)).await?;
        }

        enter(RunState::ImageResolving);
        let mut images = until_cancelled(shutdown, self.engine.find_images(&reference)).await?;
        if images.len() != 1 {
            return Err(RunError::ImageResolution {
                reference,
                matches: images.len(),
            });
        }
        let image = images.remove(0);
        tracing::debug!(image = %reference, id = %image.id, "image resolved");

        enter(RunState::Configuring);
        let config = RunConfig::resolve(
            &reference,
            &request.defaults,
            &image.labels,
            &request.label_prefix,
        )?;
        tracing::debug!(
            timeout = ?config.timeout,
            memory_limit = %format_bytes_iec(config.memory_limit_bytes as u64),
            concurrent = config.concurrent,
            "effective run configuration"
        );

        let _lock = if config.concurrent {
            None
        } else {
            let path = match &self.lock_path {
                Some(path) => path.clone(),
                None => std::env::current_exe()?,
            };
            let lock = InstanceLock::acquire_or_fail(&path)?;
            tracing::debug!(path = %lock.path().display(), "acquired instance lock");
            Some(lock)
        };

        let deadline = Instant::now() + config.timeout;

        enter(RunState::Creating);
        let spec = self.container_spec(&config)?;
        // Create always runs to completion so the container it makes is guarded.
        let created = self.engine.create_container(&spec).await?;
        for warning in &created.warnings {
            tracing::warn!(container = %created.id, "{warning}");
        }
        tracing::debug!(container = %created.id, "container created");

        let container = ContainerGuard::new(Arc::clone(&self.engine), created.id);
        let outcome = match interrupted_during_create(deadline, shutdown) {
            Some(err) => Err(err),
            None => self.drive(&container, deadline, io, shutdown).await,
        };

        enter(RunState::Cleaning);
        container.release().await;

        enter(RunState::Done);
        outcome
    }

    fn container_spec(&self, config: &RunConfig) -> Result<ContainerSpec, RunError> {
        let workdir = match (&config.bind_cwd_target, &self.workdir) {
            (None, _) => PathBuf::new(),
            (Some(_), Some(dir)) => dir.clone(),
            (Some(_), None) => std::env::current_dir()?,
        };
        Ok(ContainerSpec::from_config(config, &workdir))
    }

    /// Starting, Attaching and Running for an existing container.
    async fn drive(
        &self,
        container: &ContainerGuard,
        deadline: Instant,
        io: AttachIo,
        shutdown: &Shutdown,
    ) -> Result<(), RunError> {
        let id = container.id();

        enter(RunState::Starting);
        until_deadline(deadline, shutdown, self.engine.start_container(id), || {
            RunError::Start {
                id: id.to_string(),
                message: "run timeout expired during start".to_string(),
            }
        })
        .await?;

        enter(RunState::Attaching);
        let streams = until_deadline(deadline, shutdown, self.engine.attach_container(id), || {
            RunError::Attach {
                id: id.to_string(),
                message: "run timeout expired during attach".to_string(),
            }
        })
        .await?;
        let mut bridge = AttachBridge::spawn(streams, io);

        enter(RunState::Running);
        let cause = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => TerminationSignal::TimeoutExpired,
            _ = bridge.closed() => TerminationSignal::StreamClosed,
            _ = shutdown.cancelled() => match shutdown.signal() {
                Some(_) => TerminationSignal::ExternalInterrupt,
                None => TerminationSignal::UpstreamContextCancelled,
            },
        };
        drop(bridge);
        tracing::debug!(container = %id, cause = ?cause, "run finished");

        match cause {
            TerminationSignal::TimeoutExpired | TerminationSignal::StreamClosed => Ok(()),
            TerminationSignal::ExternalInterrupt | TerminationSignal::UpstreamContextCancelled => {
                Err(shutdown.termination_error())
            }
        }
    }
}

fn interrupted_during_create(deadline: Instant, shutdown: &Shutdown) -> Option<RunError> {
    if shutdown.is_cancelled() {
        Some(shutdown.termination_error())
    } else if Instant::now() >= deadline {
        Some(RunError::Create(
            "run timeout expired during creation".to_string(),
        ))
    } else {
        None
    }
}

fn enter(state: RunState) {
    tracing::debug!(state = %state, "run state");
}

async fn until_cancelled<T>(
    shutdown: &Shutdown,
    operation: impl Future<Output = Result<T, RunError>>,
) -> Result<T, RunError> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(shutdown.termination_error()),
        result = operation => result,
    }
}

async fn until_deadline<T>(
    deadline: Instant,
    shutdown: &Shutdown,
    operation: impl Future<Output = Result<T, RunError>>,
    expired: impl FnOnce() -> RunError,
) -> Result<T, RunError> {
    match tokio::time::timeout_at(deadline, until_cancelled(shutdown, operation)).await {
        Ok(result) => result,
        Err(_) => Err(expired()),
    }
}
