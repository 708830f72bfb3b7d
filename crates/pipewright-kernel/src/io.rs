//! Stage input handles.
//!
//! Every stage is started with a `StageInput`. The engine produces the
//! `Child` and `Pipe` variants while wiring a chain; callers pick one of the
//! others for the head stage.

use std::fmt;
use std::process::Stdio;

use tokio::io::AsyncRead;
use tokio::process::ChildStdout;

use crate::scheduler::PipeReader;

/// The input stream a stage is started with.
#[derive(Default)]
pub enum StageInput {
    /// The host process's own stdin.
    #[default]
    Inherit,
    /// An empty stream (EOF at once).
    Null,
    /// A fixed buffer, read to its end and then EOF.
    Bytes(Vec<u8>),
    /// The stdout of an upstream external stage (an OS pipe), with that
    /// stage's buffer hint.
    Child {
        stdout: ChildStdout,
        buffer_hint: Option<usize>,
    },
    /// The reading half of an upstream filter's in-process pipe.
    Pipe(PipeReader),
}

impl StageInput {
    /// Convenience for `StageInput::Bytes`.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        StageInput::Bytes(data.into())
    }

    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StageInput::Inherit => "inherit",
            StageInput::Null => "null",
            StageInput::Bytes(_) => "bytes",
            StageInput::Child { .. } => "child",
            StageInput::Pipe(_) => "pipe",
        }
    }
}

impl fmt::Debug for StageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageInput::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
            other => f.write_str(other.kind()),
        }
    }
}

/// How the default input of `Chain::execute` is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputMode {
    /// Read the host process's stdin.
    #[default]
    Inherit,
    /// Start the head stage on an empty stream.
    Null,
}

impl From<InputMode> for StageInput {
    fn from(mode: InputMode) -> Self {
        match mode {
            InputMode::Inherit => StageInput::Inherit,
            InputMode::Null => StageInput::Null,
        }
    }
}

/// Boxed byte source handed to a filter.
pub(crate) type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// What an external stage's stdin is bound to.
pub(crate) enum StdinBinding {
    /// Pass straight to the child as `Stdio`.
    Direct(Stdio),
    /// Pipe the child's stdin and copy this source into it.
    Pump(ByteSource),
}

impl StageInput {
    /// Turn the input into a byte source for an in-process filter, along
    /// with the read buffer size the upstream stage asked for.
    pub(crate) fn into_source(self) -> (ByteSource, Option<usize>) {
        match self {
            StageInput::Inherit => (Box::new(tokio::io::stdin()), None),
            StageInput::Null => (Box::new(tokio::io::empty()), None),
            StageInput::Bytes(data) => (Box::new(std::io::Cursor::new(data)), None),
            StageInput::Child { stdout, buffer_hint } => (Box::new(stdout), buffer_hint),
            StageInput::Pipe(reader) => (Box::new(reader), None),
        }
    }

    /// Decide how an external stage's stdin is bound.
    ///
    /// An upstream child's stdout is handed over as a real OS pipe, so two
    /// adjacent external stages talk without the host in between.
    pub(crate) fn into_stdin_binding(self) -> std::io::Result<StdinBinding> {
        Ok(match self {
            StageInput::Inherit => StdinBinding::Direct(Stdio::inherit()),
            StageInput::Null => StdinBinding::Direct(Stdio::null()),
            StageInput::Child { stdout, .. } => StdinBinding::Direct(stdout.try_into()?),
            StageInput::Bytes(data) => StdinBinding::Pump(Box::new(std::io::Cursor::new(data))),
            StageInput::Pipe(reader) => StdinBinding::Pump(Box::new(reader)),
        })
    }
}
