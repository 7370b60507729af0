//! Bridge between the engine's attach stream and local stdio.
//!
//! Output frames are demultiplexed onto stdout/stderr, local stdin is copied
//! into the container and shut down on EOF. The bridge reports the remote
//! side closing through a oneshot channel; dropping the bridge stops both
//! copy tasks.

use bollard::container::{AttachContainerResults, LogOutput};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Local endpoints the container's stdio is bridged to.
pub struct AttachIo {
    pub stdin: Box<dyn AsyncRead + Send + Unpin>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
    pub stderr: Box<dyn AsyncWrite + Send + Unpin>,
}

impl AttachIo {
    /// The process's own standard streams.
    pub fn process() -> Self {
        Self {
            stdin: Box::new(tokio::io::stdin()),
            stdout: Box::new(tokio::io::stdout()),
            stderr: Box::new(tokio::io::stderr()),
        }
    }

    /// No input, output discarded.
    pub fn detached() -> Self {
        Self {
            stdin: Box::new(tokio::io::empty()),
            stdout: Box::new(tokio::io::sink()),
            stderr: Box::new(tokio::io::sink()),
        }
    }
}

/// Running stdio bridge for one attached container.
pub struct AttachBridge {
    closed: oneshot::Receiver<()>,
    output_task: JoinHandle<()>,
    input_task: JoinHandle<()>,
}

impl AttachBridge {
    /// Starts copying in both directions.
    pub fn spawn(streams: AttachContainerResults, io: AttachIo) -> Self {
        let AttachContainerResults { output, mut input } = streams;
        let AttachIo {
            mut stdin,
            stdout,
            stderr,
        } = io;
        let (closed_tx, closed) = oneshot::channel();

        let output_task = tokio::spawn(async move {
            pump_output(output, stdout, stderr).await;
            let _ = closed_tx.send(());
        });

        let input_task = tokio::spawn(async move {
            match tokio::io::copy(&mut stdin, &mut input).await {
                Ok(bytes) => tracing::trace!(bytes, "stdin reached EOF"),
                Err(e) => tracing::debug!(error = %e, "stdin copy failed"),
            }
            let _ = input.shutdown().await;
        });

        Self {
            closed,
            output_task,
            input_task,
        }
    }

    /// Resolves when the container side of the stream has closed.
    ///
    /// Cancel-safe; must not be awaited again after it has resolved.
    pub async fn closed(&mut self) {
        let _ = (&mut self.closed).await;
    }
}

impl Drop for AttachBridge {
    fn drop(&mut self) {
        self.output_task.abort();
        self.input_task.abort();
    }
}

async fn pump_output<S>(
    mut output: S,
    mut stdout: Box<dyn AsyncWrite + Send + Unpin>,
    mut stderr: Box<dyn AsyncWrite + Send + Unpin>,
) where
    S: futures::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
{
    while let Some(frame) = output.next().await {
        let written = match frame {
            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                write_frame(&mut stdout, &message).await
            }
            Ok(LogOutput::StdErr { message }) => write_frame(&mut stderr, &message).await,
            Ok(LogOutput::StdIn { .. }) => Ok(()),
            Err(e) => {
                tracing::debug!(error = %e, "attach stream ended with error");
                break;
            }
        };
        if let Err(e) = written {
            tracing::debug!(error = %e, "failed to forward container output");
            break;
        }
    }
    let _ = stdout.flush().await;
    let _ = stderr.flush().await;
}

async fn write_frame(
    sink: &mut Box<dyn AsyncWrite + Send + Unpin>,
    message: &[u8],
) -> std::io::Result<()> {
    sink.write_all(message).await?;
    sink.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::errors::Error as EngineError;
    use bytes::Bytes;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use std::time::Duration;

    /// AsyncWrite into a shared buffer.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl AsyncWrite for Captured {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_demultiplexes_and_reports_close() {
        let frames: Vec<Result<LogOutput, EngineError>> = vec![
            Ok(LogOutput::StdOut {
                message: Bytes::from_static(b"hello "),
            }),
            Ok(LogOutput::StdErr {
                message: Bytes::from_static(b"oops"),
            }),
            Ok(LogOutput::StdOut {
                message: Bytes::from_static(b"world"),
            }),
        ];
        let streams = AttachContainerResults {
            output: Box::pin(futures::stream::iter(frames)),
            input: Box::pin(tokio::io::sink()),
        };
        let stdout = Captured::default();
        let stderr = Captured::default();
        let io = AttachIo {
            stdin: Box::new(tokio::io::empty()),
            stdout: Box::new(stdout.clone()),
            stderr: Box::new(stderr.clone()),
        };

        let mut bridge = AttachBridge::spawn(streams, io);
        tokio::time::timeout(Duration::from_secs(1), bridge.closed())
            .await
            .expect("bridge closed");

        assert_eq!(stdout.text(), "hello world");
        assert_eq!(stderr.text(), "oops");
    }

    #[tokio::test]
    async fn test_forwards_stdin() {
        let captured = Captured::default();
        let streams = AttachContainerResults {
            output: Box::pin(futures::stream::pending::<Result<LogOutput, EngineError>>()),
            input: Box::pin(captured.clone()),
        };
        let io = AttachIo {
            stdin: Box::new(&b"input line\n"[..]),
            stdout: Box::new(tokio::io::sink()),
            stderr: Box::new(tokio::io::sink()),
        };

        let _bridge = AttachBridge::spawn(streams, io);
        for _ in 0..50 {
            if !captured.text().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(captured.text(), "input line\n");
    }

    #[tokio::test]
    async fn test_open_stream_does_not_report_close() {
        let streams = AttachContainerResults {
            output: Box::pin(futures::stream::pending::<Result<LogOutput, EngineError>>()),
            input: Box::pin(tokio::io::sink()),
        };
        let mut bridge = AttachBridge::spawn(streams, AttachIo::detached());

        let result = tokio::time::timeout(Duration::from_millis(50), bridge.closed()).await;
        assert!(result.is_err());
    }
}
