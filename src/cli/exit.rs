//! Mapping of a run's outcome onto the process exit code.

use std::error::Error as _;

use crate::error::RunError;

/// Exit code and the message to print on stderr, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitDisposition {
    pub code: i32,
    pub message: Option<String>,
}

/// Classifies `outcome`.
///
/// Success exits 0. A forwarded signal exits with its signal-derived code
/// and is only reported in verbose mode. Anything else exits 1 and is always
/// reported: the full error chain when verbose, a single line otherwise.
pub fn classify(outcome: &Result<(), RunError>, verbose: bool) -> ExitDisposition {
    let err = match outcome {
        Ok(()) => {
            return ExitDisposition {
                code: 0,
                message: verbose.then(|| "Process ends normally.".to_string()),
            }
        }
        Err(err) => err,
    };

    let verbose_message = || format!("Process ends abnormally. Reason: {}", error_chain(err));

    match err.signal_exit_code() {
        Some(code) => ExitDisposition {
            code,
            message: verbose.then(verbose_message),
        },
        None => ExitDisposition {
            code: 1,
            message: Some(if verbose {
                verbose_message()
            } else {
                err.to_string()
            }),
        },
    }
}

fn error_chain(err: &RunError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !chain.ends_with(&cause_text) {
            chain.push_str(": ");
            chain.push_str(&cause_text);
        }
        source = cause.source();
    }
    chain
}
