//! Resource limits and the container specification handed to the engine.
//!
//! The memory ceiling comes from the resolved run options; the process cap
//! and OOM bias are fixed for every run.

use std::path::{Path, PathBuf};

use crate::options::RunConfig;

/// Maximum number of processes inside the container.
pub const MAX_PROCESSES: i64 = 128;

/// OOM score adjustment making the container the preferred OOM-kill target.
pub const OOM_SCORE_ADJ: i64 = 1000;

/// Resource limits applied to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Hard memory limit in bytes; also used as the memory reservation.
    pub memory_bytes: i64,
    /// Process count cap.
    pub max_processes: i64,
    /// OOM score adjustment (-1000..=1000).
    pub oom_score_adj: i64,
}

impl ResourceLimits {
    /// Creates limits with the given memory ceiling and the fixed defaults.
    pub fn with_memory(memory_bytes: i64) -> Self {
        Self {
            memory_bytes,
            max_processes: MAX_PROCESSES,
            oom_score_adj: OOM_SCORE_ADJ,
        }
    }
}

/// Read-write bind mount of a host directory into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
}

/// Everything the engine needs to create the run's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Container command arguments, appended to the image entrypoint.
    pub args: Vec<String>,
    pub stop_timeout_secs: i64,
    pub limits: ResourceLimits,
    pub bind: Option<BindMount>,
}

impl ContainerSpec {
    /// Builds the spec for `config`, binding `workdir` when a target is configured.
    pub fn from_config(config: &RunConfig, workdir: &Path) -> Self {
        Self {
            image: config.image.clone(),
            args: config.args.clone(),
            stop_timeout_secs: config.stop_timeout_secs,
            limits: ResourceLimits::with_memory(config.memory_limit_bytes),
            bind: config.bind_cwd_target.as_ref().map(|target| BindMount {
                source: workdir.to_path_buf(),
                target: target.clone(),
            }),
        }
    }
}
