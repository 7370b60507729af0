//! Run option resolution.
//!
//! Command-line values form the defaults; image labels carrying the
//! configured prefix override them. The result is an immutable
//! [`RunConfig`] that is passed down the run lifecycle.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::RunError;
use crate::units::{parse_bytes, parse_duration};

/// Tag appended to image references that carry none.
pub const DEFAULT_TAG: &str = "latest";

/// Default label prefix identifying per-image run options.
pub const DEFAULT_LABEL_PREFIX: &str = "DRO_";

/// Option names recognised after the label prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOption {
    MemoryLimit,
    BindCwd,
    Timeout,
    Concurrent,
}

impl RunOption {
    /// Matches a label suffix case-sensitively. Unknown suffixes yield `None`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "MEMORY_LIMIT" => Some(RunOption::MemoryLimit),
            "BIND_CWD" => Some(RunOption::BindCwd),
            "TIMEOUT" => Some(RunOption::Timeout),
            "CONCURRENT" => Some(RunOption::Concurrent),
            _ => None,
        }
    }
}

/// Appends `:latest` to references without a tag separator.
pub fn normalize_reference(image: &str) -> String {
    if image.contains(':') {
        image.to_string()
    } else {
        format!("{image}:{DEFAULT_TAG}")
    }
}

/// References naming a registry or repository path are pulled before use.
pub fn is_remote_reference(reference: &str) -> bool {
    reference.contains('/')
}

/// Run options as given on the command line, before label overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDefaults {
    /// Overall run timeout, e.g. `10s`.
    pub timeout: String,
    /// Container memory ceiling, e.g. `128Mi`.
    pub memory_limit: String,
    /// In-container target for the working directory bind mount; empty disables it.
    pub bind_cwd: String,
    /// Whether several instances may run at once.
    pub concurrent: bool,
    /// Seconds the container gets to honour its stop signal.
    pub stop_timeout_secs: i64,
    /// Arguments passed as the container command.
    pub args: Vec<String>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            timeout: "10s".to_string(),
            memory_limit: "128Mi".to_string(),
            bind_cwd: "/host".to_string(),
            concurrent: true,
            stop_timeout_secs: 1,
            args: Vec::new(),
        }
    }
}

impl RunDefaults {
    /// Checks that the command-line values parse on their own.
    pub fn validate(&self) -> Result<(), RunError> {
        parse_memory_limit(&self.memory_limit)?;
        parse_timeout(&self.timeout)?;
        Ok(())
    }
}

fn parse_memory_limit(value: &str) -> Result<i64, RunError> {
    let bytes = parse_bytes(value)
        .map_err(|e| RunError::config(format!("invalid memory limit '{value}': {e}")))?;
    i64::try_from(bytes)
        .map_err(|_| RunError::config(format!("memory limit '{value}' is too large")))
}

fn parse_timeout(value: &str) -> Result<Duration, RunError> {
    parse_duration(value).map_err(|e| RunError::config(format!("invalid run timeout '{value}': {e}")))
}

/// Fully resolved options for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Image reference, always tagged.
    pub image: String,
    pub timeout: Duration,
    pub memory_limit_bytes: i64,
    /// In-container path for the working directory bind mount.
    pub bind_cwd_target: Option<String>,
    pub concurrent: bool,
    pub stop_timeout_secs: i64,
    pub args: Vec<String>,
}

impl RunConfig {
    /// Merges `defaults` with the prefixed `labels` of the resolved image.
    ///
    /// Label values win unconditionally. `CONCURRENT` is true only for the
    /// literal `"true"`.
    pub fn resolve(
        image: &str,
        defaults: &RunDefaults,
        labels: &HashMap<String, String>,
        label_prefix: &str,
    ) -> Result<Self, RunError> {
        let mut timeout = defaults.timeout.as_str();
        let mut memory_limit = defaults.memory_limit.as_str();
        let mut bind_cwd = defaults.bind_cwd.as_str();
        let mut concurrent = defaults.concurrent;

        for (key, value) in labels {
            let Some(option) = key
                .strip_prefix(label_prefix)
                .and_then(RunOption::from_suffix)
            else {
                continue;
            };
            tracing::debug!(label = %key, value = %value, "applying image label override");
            match option {
                RunOption::MemoryLimit => memory_limit = value.as_str(),
                RunOption::BindCwd => bind_cwd = value.as_str(),
                RunOption::Timeout => timeout = value.as_str(),
                RunOption::Concurrent => concurrent = value == "true",
            }
        }

        Ok(Self {
            image: normalize_reference(image),
            timeout: parse_timeout(timeout)?,
            memory_limit_bytes: parse_memory_limit(memory_limit)?,
            bind_cwd_target: (!bind_cwd.is_empty()).then(|| bind_cwd.to_string()),
            concurrent,
            stop_timeout_secs: defaults.stop_timeout_secs,
            args: defaults.args.clone(),
        })
    }
}
