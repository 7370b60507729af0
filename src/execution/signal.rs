//! Process-wide cancellation driven by OS signals.
//!
//! [`Shutdown`] wraps the single [`CancellationToken`] every listener
//! observes, plus the signal (if any) that triggered it. [`listen`] installs
//! the signal listener for the lifetime of the process.

use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;

/// An OS signal that terminates the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub name: &'static str,
    pub number: i32,
}

impl Signal {
    pub const HANGUP: Signal = Signal {
        name: "SIGHUP",
        number: 1,
    };
    pub const INTERRUPT: Signal = Signal {
        name: "SIGINT",
        number: 2,
    };
    pub const TERMINATE: Signal = Signal {
        name: "SIGTERM",
        number: 15,
    };

    /// Conventional shell exit code for death by this signal.
    pub fn exit_code(&self) -> i32 {
        128 + self.number
    }
}

/// Shared cancellation state for one process.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    signal: Arc<OnceLock<Signal>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `signal` (first one wins) and cancels.
    pub fn trigger(&self, signal: Signal) {
        let _ = self.signal.set(signal);
        self.token.cancel();
    }

    /// Cancels without a signal, e.g. from an embedding caller.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Signal that caused cancellation, if any.
    pub fn signal(&self) -> Option<Signal> {
        self.signal.get().copied()
    }

    /// Error value describing why the run was cut short.
    pub fn termination_error(&self) -> RunError {
        match self.signal() {
            Some(signal) => RunError::Signal {
                name: signal.name,
                exit_code: signal.exit_code(),
            },
            None => RunError::Cancelled,
        }
    }
}

/// Spawns the signal listener. It never exits on its own.
#[cfg(unix)]
pub fn listen(shutdown: Shutdown) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let streams = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        );
        let (mut interrupt, mut terminate, mut hangup) = match streams {
            (Ok(i), Ok(t), Ok(h)) => (i, t, h),
            (i, t, h) => {
                let error = [i.err(), t.err(), h.err()].into_iter().flatten().next();
                tracing::warn!(error = ?error, "failed to install signal handlers");
                return;
            }
        };

        loop {
            let received = tokio::select! {
                _ = interrupt.recv() => Signal::INTERRUPT,
                _ = terminate.recv() => Signal::TERMINATE,
                _ = hangup.recv() => Signal::HANGUP,
            };
            tracing::info!(signal = received.name, "received signal");
            shutdown.trigger(received);
        }
    })
}

/// Spawns the signal listener. It never exits on its own.
#[cfg(not(unix))]
pub fn listen(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            tracing::info!(signal = Signal::INTERRUPT.name, "received signal");
            shutdown.trigger(Signal::INTERRUPT);
        }
    })
}
