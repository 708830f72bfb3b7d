//! Pipeline execution.
//!
//! `execute` finds the head of the chain and runs it. Running a stage starts
//! its own work (a shell child or a filter task), then runs the next stage
//! with this stage's output as input, and only then waits for its own work.
//! Every stage is therefore live before anything is waited on, which is what
//! keeps pipes larger than their buffers from deadlocking.
//!
//! The chain's status is the status of its last stage. A filter counts as 0.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::chain::{Chain, StageId};
use crate::error::{PipelineError, Result};
use crate::filter::{FilterBody, FilterInput, FilterOutput, DEFAULT_READ_BUFFER};
use crate::io::{ByteSource, StageInput, StdinBinding};
use crate::scheduler::{pipe_stream, spawn_filter};
use crate::stage::{StageKind, StageOptions};

type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<i32>> + Send + 'a>>;

impl Chain {
    /// Run the whole chain with the configured default input.
    ///
    /// Returns once every stage has finished. The exit status is stored on
    /// this chain value (see [`Chain::exit_status`]) and `self` is handed
    /// back so results can be read off the filters.
    #[tracing::instrument(level = "info", skip(self), fields(pipeline = %self))]
    pub async fn execute(&mut self) -> Result<&mut Self> {
        let input = StageInput::from(self.config.default_input);
        self.run_from_head(input).await
    }

    /// Run the whole chain, feeding `input` to the head stage.
    #[tracing::instrument(level = "info", skip(self), fields(pipeline = %self, input = input.kind()))]
    pub async fn execute_with(&mut self, input: StageInput) -> Result<&mut Self> {
        self.run_from_head(input).await
    }

    async fn run_from_head(&mut self, input: StageInput) -> Result<&mut Self> {
        self.exit_status = None;
        let head = self.head();
        let status = self.run_stage(head, input).await?;
        tracing::debug!(status, "pipeline finished");
        self.exit_status = Some(status);
        Ok(self)
    }

    fn run_stage(&mut self, id: StageId, input: StageInput) -> StageFuture<'_> {
        Box::pin(async move {
            let is_filter = matches!(self.records[id.0].stage.kind, StageKind::Filter(_));
            if is_filter {
                self.run_filter(id, input).await
            } else {
                self.run_external(id, input).await
            }
        })
    }

    async fn run_external(&mut self, id: StageId, input: StageInput) -> Result<i32> {
        let (next, options, line) = {
            let record = &self.records[id.0];
            let line = match &record.stage.kind {
                StageKind::External(cmd) => cmd.line().to_string(),
                StageKind::Filter(_) => unreachable!("run_external on a filter stage"),
            };
            (record.next, record.stage.options.clone(), line)
        };

        let mut cmd = Command::new(&self.config.shell);
        cmd.arg(&self.config.shell_flag).arg(&line);
        if let Some(dir) = &options.cwd {
            cmd.current_dir(dir);
        }
        // Dropping an unwaited child kills it, so an error further down the
        // chain leaves nothing running.
        cmd.kill_on_drop(true);

        let pump_source = match input.into_stdin_binding()? {
            StdinBinding::Direct(stdio) => {
                cmd.stdin(stdio);
                None
            }
            StdinBinding::Pump(source) => {
                cmd.stdin(Stdio::piped());
                Some(source)
            }
        };
        cmd.stdout(if next.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = cmd.spawn().map_err(|source| PipelineError::Spawn {
            command: line.clone(),
            source,
        })?;
        // The command still holds the parent's copy of an upstream pipe end;
        // release it so the upstream writer sees EPIPE if this child exits early.
        drop(cmd);
        tracing::debug!(stage = %id, command = %line, pid = ?child.id(), "spawned external stage");

        let pump = pump_source.and_then(|source| start_pump(&mut child, source, &options));

        let status = match next {
            Some(next) => {
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
                let downstream = StageInput::Child {
                    stdout,
                    buffer_hint: options.buffer_hint,
                };
                let status = self.run_stage(next, downstream).await?;
                wait_child(&mut child, &line).await?;
                status
            }
            None => wait_child(&mut child, &line).await?,
        };

        if let Some(pump) = pump {
            finish_pump(pump, &line).await;
        }
        Ok(status)
    }

    async fn run_filter(&mut self, id: StageId, input: StageInput) -> Result<i32> {
        let capacity = self.config.pipe_capacity;
        let (next, encoding, body) = {
            let record = &mut self.records[id.0];
            let slot = match &mut record.stage.kind {
                StageKind::Filter(slot) => slot,
                StageKind::External(_) => unreachable!("run_filter on an external stage"),
            };
            let body = slot.body.take().ok_or_else(|| PipelineError::FilterUnavailable {
                stage: slot.name.clone(),
            })?;
            (record.next, record.stage.options.encoding, body)
        };

        let (source, buffer) = input.into_source();
        let stdin = FilterInput::new(source, buffer, encoding);
        let stderr = FilterOutput::new(Box::new(tokio::io::stderr()), encoding);

        let (stdout, downstream, meter) = match next {
            Some(next) => {
                let (writer, reader) = pipe_stream(capacity);
                tracing::trace!(stage = %id, capacity, "filter output piped");
                let meter = writer.meter();
                (
                    FilterOutput::new(Box::new(writer), encoding),
                    Some((next, StageInput::Pipe(reader))),
                    Some(meter),
                )
            }
            None => (
                FilterOutput::new(Box::new(tokio::io::stdout()), encoding),
                None,
                None,
            ),
        };

        tracing::debug!(stage = %id, filter = %body.name(), "starting filter worker");
        let worker = spawn_filter(body, stdin, stdout, stderr);

        let status = match downstream {
            Some((next, input)) => match self.run_stage(next, input).await {
                Ok(status) => status,
                Err(e) => {
                    if let Some(body) = worker.cancel().await {
                        self.restore_filter(id, body);
                    }
                    return Err(e);
                }
            },
            None => 0,
        };

        let (body, outcome) = worker.join().await?;
        self.restore_filter(id, body);
        if let Some(meter) = meter {
            tracing::trace!(
                stage = %id,
                bytes = meter.bytes_written(),
                reader_closed = meter.is_reader_closed(),
                "filter output drained"
            );
        }
        outcome?;
        Ok(status)
    }

    fn restore_filter(&mut self, id: StageId, body: FilterBody) {
        if let StageKind::Filter(slot) = &mut self.records[id.0].stage.kind {
            slot.body = Some(body);
        }
    }
}

/// Copy an in-process source into the child's piped stdin.
///
/// The child's stdin is dropped when the copy ends, which is its EOF.
fn start_pump(
    child: &mut Child,
    source: ByteSource,
    options: &StageOptions,
) -> Option<JoinHandle<io::Result<u64>>> {
    let mut sink = child.stdin.take()?;
    let capacity = options.buffer_hint.unwrap_or(DEFAULT_READ_BUFFER);
    Some(tokio::spawn(async move {
        let mut source = BufReader::with_capacity(capacity, source);
        tokio::io::copy_buf(&mut source, &mut sink).await
    }))
}

async fn finish_pump(pump: JoinHandle<io::Result<u64>>, line: &str) {
    match pump.await {
        Ok(Ok(bytes)) => tracing::trace!(command = %line, bytes, "stdin pump finished"),
        // The child stopped reading before its input ended, e.g. `head -1`.
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!(command = %line, "child closed stdin early")
        }
        Ok(Err(e)) => tracing::warn!(command = %line, error = %e, "stdin pump failed"),
        Err(e) => tracing::warn!(command = %line, error = %e, "stdin pump task failed"),
    }
}

async fn wait_child(child: &mut Child, line: &str) -> Result<i32> {
    let status = child.wait().await.map_err(|source| PipelineError::Wait {
        command: line.to_string(),
        source,
    })?;
    let code = exit_code(status);
    tracing::debug!(command = %line, code, "external stage exited");
    Ok(code)
}

/// Exit code of a finished process; death by signal maps to 128 + signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            128 + status.signal().unwrap_or(0)
        }
        #[cfg(not(unix))]
        {
            -1
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{CaptureText, CountLines};
    use crate::stage::Stage;

    #[tokio::test]
    async fn test_single_external_status() {
        let mut chain = Chain::from(Stage::sh("exit 3"));
        chain.execute_with(StageInput::Null).await.unwrap();
        assert_eq!(chain.exit_status(), Some(3));
    }

    #[tokio::test]
    async fn test_bytes_input_reaches_external() {
        let mut chain = Stage::sh("tr a-z A-Z") | Stage::filter(CaptureText::default());
        chain.execute_with(StageInput::bytes("shout")).await.unwrap();
        assert_eq!(chain.filter::<CaptureText>().unwrap().text(), "SHOUT");
    }

    #[tokio::test]
    async fn test_filter_result_survives_run() {
        let mut chain = Stage::sh("printf 'a\\nb\\n'")
            | Stage::filter(CountLines::default())
            | Stage::filter(CaptureText::default());
        chain.execute_with(StageInput::Null).await.unwrap();
        assert_eq!(chain.find::<CountLines>().unwrap().count(), 2);
        assert_eq!(chain.filter::<CaptureText>().unwrap().text(), "2\n");
        assert_eq!(chain.exit_status(), Some(0));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let mut chain = Chain::from(Stage::sh("true").cwd("/definitely/not/a/dir"));
        let err = chain.execute_with(StageInput::Null).await.unwrap_err();
        assert!(matches!(err, PipelineError::Spawn { .. }), "{err:?}");
        assert_eq!(chain.exit_status(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_maps_to_128_plus() {
        let mut chain = Chain::from(Stage::sh("kill -9 $$"));
        chain.execute_with(StageInput::Null).await.unwrap();
        assert_eq!(chain.exit_status(), Some(128 + 9));
    }
}
