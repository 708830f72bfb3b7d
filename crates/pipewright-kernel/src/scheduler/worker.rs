//! Filter workers: one tokio task per filter stage per run.
//!
//! The task owns the filter and both ends of its stream pair for the whole
//! run. Output is shut down once `process` returns, on success and failure
//! alike, and a panic drops it during unwinding, so the downstream reader
//! always reaches EOF. The input is dropped when the task ends, which lets an
//! upstream writer see a broken pipe instead of blocking forever.

use std::io;

use tokio::task::JoinHandle;

use crate::error::{PipelineError, Result};
use crate::filter::{FilterBody, FilterInput, FilterOutput};

/// Handle to a running filter task.
pub(crate) struct FilterWorker {
    stage: String,
    handle: JoinHandle<(FilterBody, io::Result<()>)>,
}

/// Start `body` on its own task.
pub(crate) fn spawn_filter(
    mut body: FilterBody,
    mut stdin: FilterInput,
    mut stdout: FilterOutput,
    mut stderr: FilterOutput,
) -> FilterWorker {
    let stage = body.name().to_string();
    let handle = tokio::spawn(async move {
        let outcome = body.run(&mut stdin, &mut stdout, &mut stderr).await;
        let closed = stdout.close().await;
        if let Err(e) = stderr.flush().await {
            tracing::trace!(error = %e, "filter stderr flush failed");
        }
        drop(stdin);
        (body, outcome.and(closed))
    });

    FilterWorker { stage, handle }
}

impl FilterWorker {
    /// Stop the task after a downstream stage failed.
    ///
    /// A task that already finished is not affected by the abort, so its
    /// filter comes back and stays inspectable. One still running is
    /// cancelled at its next await and its filter is lost.
    pub(crate) async fn cancel(self) -> Option<FilterBody> {
        self.handle.abort();
        match self.handle.await {
            Ok((body, _)) => Some(body),
            Err(e) => {
                tracing::debug!(stage = %self.stage, error = %e, "filter worker cancelled");
                None
            }
        }
    }

    /// Wait for the task and hand the filter back, together with the
    /// outcome of its `process` call.
    ///
    /// The outer error is a worker that never finished (panic or abort).
    /// A broken pipe means the downstream reader went away early; like a
    /// command killed by SIGPIPE that is not reported as a failure.
    pub(crate) async fn join(self) -> Result<(FilterBody, Result<()>)> {
        let (body, outcome) = self.handle.await.map_err(|e| {
            tracing::error!(stage = %self.stage, error = %e, "filter worker did not finish");
            PipelineError::WorkerPanicked {
                stage: self.stage.clone(),
            }
        })?;

        let outcome = match outcome {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                tracing::debug!(stage = %self.stage, "filter output closed by reader");
                Ok(())
            }
            Err(source) => Err(PipelineError::Filter {
                stage: self.stage,
                source,
            }),
        };
        Ok((body, outcome))
    }
}
