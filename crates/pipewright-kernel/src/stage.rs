//! Stages, the units a chain is built from.
//!
//! A stage is either an external command run through the shell or an
//! in-process filter. Options are per stage and never spread to the rest of
//! the chain.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::encoding::Encoding;
use crate::filter::{Filter, FilterBody, LineFilter};

/// A shell command line.
///
/// Tokens are joined with single spaces and handed to the shell untouched.
/// Quoting is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    line: String,
}

impl ExternalCommand {
    /// Build from tokens, joined with single spaces.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line = tokens
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Self { line }
    }

    /// The command line passed to the shell.
    pub fn line(&self) -> &str {
        &self.line
    }
}

/// Per-stage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOptions {
    /// Working directory for an external stage.
    pub cwd: Option<PathBuf>,
    /// Encoding for a filter's text helpers; `None` means raw bytes.
    pub encoding: Option<Encoding>,
    /// Buffer size for an external stage's stream plumbing: the stdin pump
    /// and the read buffer a downstream filter puts over its stdout.
    pub buffer_hint: Option<usize>,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            encoding: Some(Encoding::Utf8),
            buffer_hint: None,
        }
    }
}

/// A filter slot. Empty only while the filter's worker is running, or for
/// good if that worker never came back.
pub(crate) struct FilterSlot {
    pub(crate) name: String,
    pub(crate) body: Option<FilterBody>,
}

pub(crate) enum StageKind {
    External(ExternalCommand),
    Filter(FilterSlot),
}

/// One unit of a pipeline.
pub struct Stage {
    pub(crate) kind: StageKind,
    pub(crate) options: StageOptions,
}

impl Stage {
    fn with_kind(kind: StageKind) -> Self {
        Self {
            kind,
            options: StageOptions::default(),
        }
    }

    /// An external command from a full command line.
    pub fn sh(line: impl AsRef<str>) -> Self {
        Self::cmd([line])
    }

    /// An external command from tokens joined with single spaces.
    pub fn cmd<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_kind(StageKind::External(ExternalCommand::new(tokens)))
    }

    /// A stream-oriented filter stage.
    pub fn filter(filter: impl Filter) -> Self {
        let body = FilterBody::Raw(Box::new(filter));
        Self::from_body(body)
    }

    /// A line-oriented filter stage.
    pub fn lines(filter: impl LineFilter) -> Self {
        let body = FilterBody::Lines(Box::new(filter));
        Self::from_body(body)
    }

    fn from_body(body: FilterBody) -> Self {
        Self::with_kind(StageKind::Filter(FilterSlot {
            name: body.name().to_string(),
            body: Some(body),
        }))
    }

    /// Set the text encoding; `None` for raw bytes.
    pub fn enc(mut self, encoding: impl Into<Option<Encoding>>) -> Self {
        self.options.encoding = encoding.into();
        self
    }

    /// Run an external stage in `path`.
    pub fn cwd(mut self, path: impl AsRef<Path>) -> Self {
        self.options.cwd = Some(path.as_ref().to_path_buf());
        self
    }

    /// Size the buffers of an external stage's stream plumbing.
    pub fn buffer_hint(mut self, bytes: usize) -> Self {
        self.options.buffer_hint = Some(bytes);
        self
    }

    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    /// The command, if this is an external stage.
    pub fn command(&self) -> Option<&ExternalCommand> {
        match &self.kind {
            StageKind::External(cmd) => Some(cmd),
            StageKind::Filter(_) => None,
        }
    }

    pub fn is_filter(&self) -> bool {
        matches!(self.kind, StageKind::Filter(_))
    }

    /// Borrow the filter as `T`, if this stage holds one.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match &self.kind {
            StageKind::Filter(FilterSlot { body: Some(body), .. }) => body.as_any().downcast_ref(),
            _ => None,
        }
    }

    /// Mutably borrow the filter as `T`, if this stage holds one.
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match &mut self.kind {
            StageKind::Filter(FilterSlot { body: Some(body), .. }) => {
                body.as_any_mut().downcast_mut()
            }
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StageKind::External(cmd) => f.write_str(cmd.line()),
            StageKind::Filter(slot) => f.write_str(&slot.name),
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            StageKind::External(_) => "external",
            StageKind::Filter(_) => "filter",
        };
        f.debug_struct("Stage")
            .field("kind", &kind)
            .field("name", &self.to_string())
            .field("options", &self.options)
            .finish()
    }
}
