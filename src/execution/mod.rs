//! Container execution layer for docker-runonce.
//!
//! This module drives a single container through its lifecycle using the
//! bollard crate, with resource limits, a single-instance guard and
//! guaranteed cleanup.
//!
//! # Architecture
//!
//! ```text
//! RunOrchestrator ──▶ ContainerEngine (DockerClient)
//!        │                 create / start / attach / remove
//!        ├──▶ InstanceLock        (only when concurrency is disabled)
//!        ├──▶ AttachBridge        (stdio ⇄ attach stream, close notification)
//!        ├──▶ Shutdown            (signal-driven cancellation)
//!        └──▶ ContainerGuard      (forced removal, exactly once)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docker_runonce::execution::{AttachIo, DockerClient, RunOrchestrator, RunRequest, Shutdown};
//!
//! let engine = Arc::new(DockerClient::new()?);
//! let shutdown = Shutdown::new();
//! RunOrchestrator::new(engine)
//!     .run(RunRequest::new("alpine"), AttachIo::process(), &shutdown)
//!     .await?;
//! ```

pub mod attach;
pub mod container;
pub mod docker_client;
pub mod lock;
pub mod orchestrator;
pub mod resources;
pub mod signal;

pub use attach::{AttachBridge, AttachIo};
pub use container::{ContainerGuard, CLEANUP_TIMEOUT};
pub use docker_client::{ContainerEngine, CreatedContainer, DockerClient, ImageInfo};
pub use lock::InstanceLock;
pub use orchestrator::{RunOrchestrator, RunRequest, RunState, TerminationSignal};
pub use resources::{BindMount, ContainerSpec, ResourceLimits};
pub use signal::{listen, Shutdown, Signal};
