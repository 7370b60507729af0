//! Command-line surface for docker-runonce.
//!
//! When the binary is invoked under any name other than its canonical one
//! (typically through a symlink named after an image), that name becomes
//! the image to run and every argument is forwarded to the container
//! untouched.

use std::ffi::OsString;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};

use crate::error::RunError;
use crate::execution::{listen, AttachIo, DockerClient, RunOrchestrator, RunRequest, Shutdown};
use crate::options::RunDefaults;

/// Canonical binary name; any other invocation name is an implied image.
pub const DEFAULT_BINARY_NAME: &str = "docker-runonce";

const BUILD_ID: &str = match option_env!("DRO_BUILD_ID") {
    Some(id) => id,
    None => "<wip>",
};

const BUILD_DATE: &str = match option_env!("DRO_BUILD_DATE") {
    Some(date) => date,
    None => "<unknown>",
};

static VERSION: LazyLock<String> = LazyLock::new(|| {
    format!(
        "{} (commit {BUILD_ID} built on {BUILD_DATE})",
        env!("CARGO_PKG_VERSION")
    )
});

/// Run a docker image once.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = DEFAULT_BINARY_NAME)]
#[command(about = "Run a docker image once")]
#[command(
    long_about = "docker-runonce starts a single container from an image, streams its stdio, enforces a timeout and a memory limit, and always removes the container afterwards.\n\nInstall it under a symlink named after an image to run that image like a local command:\n  ln -s docker-runonce /usr/local/bin/alpine\n  alpine echo hello\n\nUnder an image-named symlink every argument goes to the container and the symlink name is always the image; the remaining options can only be set through DRO_* environment variables or image labels."
)]
pub struct Cli {
    /// Overall run timeout (e.g. 10s, 1m30s).
    #[arg(long, default_value = "10s", env = "DRO_TIMEOUT")]
    pub timeout: String,

    /// Seconds the container gets to honour its stop signal before it is killed.
    #[arg(long, default_value_t = 1, env = "DRO_STOP_TIMEOUT")]
    pub stop_timeout: i64,

    /// Target path to bind-mount the current working directory to; empty disables.
    #[arg(long, default_value = "/host", env = "DRO_BIND_CWD")]
    pub bind_cwd: String,

    /// Container memory limit (e.g. 128Mi, 1G).
    #[arg(long, default_value = "128Mi", env = "DRO_MEMORY_LIMIT")]
    pub memory_limit: String,

    /// Prefix for image labels to use as options.
    #[arg(long, default_value = "DRO_", env = "DRO_OPTION_LABEL_PREFIX")]
    pub option_label_prefix: String,

    /// Image name (default is the executable name if it is not docker-runonce).
    #[arg(long, env = "DRO_IMAGE")]
    pub image: Option<String>,

    /// Verbose output.
    #[arg(short, long, env = "DRO_VERBOSE")]
    pub verbose: bool,

    /// Allow concurrent execution.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        env = "DRO_CONCURRENT"
    )]
    pub concurrent: bool,

    /// Arguments passed to the container as its command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Converts the parsed flags into a run request.
    pub fn run_request(&self) -> RunRequest {
        RunRequest {
            image: self.image.clone().unwrap_or_default(),
            label_prefix: self.option_label_prefix.clone(),
            defaults: RunDefaults {
                timeout: self.timeout.clone(),
                memory_limit: self.memory_limit.clone(),
                bind_cwd: self.bind_cwd.clone(),
                concurrent: self.concurrent,
                stop_timeout_secs: self.stop_timeout,
                args: self.args.clone(),
            },
        }
    }
}

/// Image implied by the invocation name, if it is not the canonical one.
pub fn implied_image(argv0: &Path) -> Option<String> {
    let name = argv0.file_name()?.to_str()?;
    if name.is_empty() || name == DEFAULT_BINARY_NAME {
        None
    } else {
        Some(name.to_string())
    }
}

/// Parses the process arguments, exiting with usage on error.
pub fn parse_cli() -> Cli {
    try_parse_cli_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
}

/// Parses `args` (including argv[0]).
pub fn try_parse_cli_from<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let implied = args.first().and_then(|argv0| implied_image(Path::new(argv0)));

    // Under an image name nothing is ours to interpret: everything after
    // argv[0] belongs to the container.
    if implied.is_some() {
        args.insert(1, OsString::from("--"));
    }

    let matches = Cli::command()
        .version(VERSION.as_str())
        .try_get_matches_from(args)?;
    let mut cli = Cli::from_arg_matches(&matches)?;
    if implied.is_some() {
        cli.image = implied;
    }
    Ok(cli)
}

/// Runs one container as described by `cli`.
pub async fn run_with_cli(cli: Cli) -> Result<(), RunError> {
    let shutdown = Shutdown::new();
    let _listener = listen(shutdown.clone());

    let request = cli.run_request();
    request.validate()?;

    let engine = Arc::new(DockerClient::new()?);
    RunOrchestrator::new(engine)
        .run(request, AttachIo::process(), &shutdown)
        .await
}
