//! In-process filters: user code running as a pipeline stage.
//!
//! Two flavours:
//!
//! - [`Filter`] gets raw streams and can produce output while input is still
//!   arriving, so it behaves like a real command in the middle of a pipe.
//! - [`LineFilter`] gets the whole input already split into lines. The stage
//!   reads its upstream to EOF before `process` is called, so it is neither
//!   streaming nor memory-bounded; don't put one behind an endless producer.
//!
//! Results are kept on the filter's own fields. After `Chain::execute` the
//! filter is back in the chain and can be inspected with `Chain::find` or
//! `Chain::filter`.
//!
//! ```ignore
//! struct Upper;
//!
//! #[async_trait]
//! impl Filter for Upper {
//!     async fn process(
//!         &mut self,
//!         stdin: &mut FilterInput,
//!         stdout: &mut FilterOutput,
//!         _stderr: &mut FilterOutput,
//!     ) -> io::Result<()> {
//!         while let Some(line) = stdin.next_line().await? {
//!             stdout.write_str(&line.to_uppercase()).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let chain = Stage::sh("ls") | Stage::filter(Upper);
//! ```

use std::any::Any;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadBuf,
};

use crate::encoding::{decode_with, encode_with, Encoding};
use crate::io::ByteSource;

/// Read buffer size used when the upstream stage gives no hint.
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Downcasting support for boxed filters.
///
/// Blanket-implemented for every `Send + 'static` type; filters never
/// implement it by hand.
pub trait AsAny: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A stream-oriented in-process stage.
#[async_trait]
pub trait Filter: AsAny {
    /// Transform `stdin` into `stdout`.
    ///
    /// The engine closes `stdout` after this returns, whether it succeeded
    /// or not, so implementations never need to.
    async fn process(
        &mut self,
        stdin: &mut FilterInput,
        stdout: &mut FilterOutput,
        stderr: &mut FilterOutput,
    ) -> io::Result<()>;

    /// Display name used in logs, errors and `Chain`'s `Display`.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// A line-oriented in-process stage.
#[async_trait]
pub trait LineFilter: AsAny {
    /// Handle the complete input, split into lines with their terminators.
    async fn process(
        &mut self,
        lines: Vec<String>,
        stdout: &mut FilterOutput,
        stderr: &mut FilterOutput,
    ) -> io::Result<()>;

    /// Display name used in logs, errors and `Chain`'s `Display`.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Input stream handed to a filter.
///
/// Implements `AsyncRead` and `AsyncBufRead` for raw access; the text
/// helpers decode with the stage's encoding.
pub struct FilterInput {
    inner: BufReader<ByteSource>,
    encoding: Option<Encoding>,
}

impl FilterInput {
    pub(crate) fn new(source: ByteSource, buffer: Option<usize>, encoding: Option<Encoding>) -> Self {
        Self {
            inner: BufReader::with_capacity(buffer.unwrap_or(DEFAULT_READ_BUFFER), source),
            encoding,
        }
    }

    /// Wrap any reader, e.g. to unit-test a filter without a chain.
    pub fn from_reader(
        reader: impl AsyncRead + Send + Unpin + 'static,
        encoding: Option<Encoding>,
    ) -> Self {
        Self::new(Box::new(reader), None, encoding)
    }

    /// The encoding used by the text helpers.
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Read the next line, terminator included. `None` at EOF.
    ///
    /// A final line without a terminator is returned as-is.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut raw = Vec::new();
        if self.inner.read_until(b'\n', &mut raw).await? == 0 {
            return Ok(None);
        }
        decode_with(self.encoding, raw).map(Some)
    }

    /// Read every remaining line, terminators included.
    pub async fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Read everything up to EOF as text.
    pub async fn read_text(&mut self) -> io::Result<String> {
        let raw = self.read_bytes().await?;
        decode_with(self.encoding, raw)
    }

    /// Read everything up to EOF as bytes.
    pub async fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut raw = Vec::new();
        self.inner.read_to_end(&mut raw).await?;
        Ok(raw)
    }
}

impl AsyncRead for FilterInput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncBufRead for FilterInput {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.inner).consume(amt)
    }
}

impl std::fmt::Debug for FilterInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterInput")
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// Output stream handed to a filter (its stdout or stderr).
pub struct FilterOutput {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
    encoding: Option<Encoding>,
}

impl FilterOutput {
    pub(crate) fn new(inner: Box<dyn AsyncWrite + Send + Unpin>, encoding: Option<Encoding>) -> Self {
        Self { inner, encoding }
    }

    /// Wrap any writer, e.g. to unit-test a filter without a chain.
    pub fn from_writer(
        writer: impl AsyncWrite + Send + Unpin + 'static,
        encoding: Option<Encoding>,
    ) -> Self {
        Self::new(Box::new(writer), encoding)
    }

    /// The encoding used by `write_str`.
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Write raw bytes.
    pub async fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await
    }

    /// Encode and write text.
    pub async fn write_str(&mut self, text: &str) -> io::Result<()> {
        let data = encode_with(self.encoding, text)?;
        self.inner.write_all(&data).await
    }

    /// Flush buffered output.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    /// Flush and shut the stream down; the reader sees EOF.
    pub(crate) async fn close(&mut self) -> io::Result<()> {
        self.inner.flush().await?;
        self.inner.shutdown().await
    }
}

impl AsyncWrite for FilterOutput {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl std::fmt::Debug for FilterOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterOutput")
            .field("encoding", &self.encoding)
            .finish()
    }
}

/// A filter owned by a stage: either flavour, boxed.
pub(crate) enum FilterBody {
    Raw(Box<dyn Filter>),
    Lines(Box<dyn LineFilter>),
}

impl FilterBody {
    pub(crate) fn name(&self) -> &str {
        match self {
            FilterBody::Raw(f) => f.name(),
            FilterBody::Lines(f) => f.name(),
        }
    }

    pub(crate) fn as_any(&self) -> &dyn Any {
        match self {
            FilterBody::Raw(f) => (**f).as_any(),
            FilterBody::Lines(f) => (**f).as_any(),
        }
    }

    pub(crate) fn as_any_mut(&mut self) -> &mut dyn Any {
        match self {
            FilterBody::Raw(f) => (**f).as_any_mut(),
            FilterBody::Lines(f) => (**f).as_any_mut(),
        }
    }

    /// Run the user callback. Line filters drain their input first.
    pub(crate) async fn run(
        &mut self,
        stdin: &mut FilterInput,
        stdout: &mut FilterOutput,
        stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        match self {
            FilterBody::Raw(f) => f.process(stdin, stdout, stderr).await,
            FilterBody::Lines(f) => {
                let lines = stdin.read_lines().await?;
                f.process(lines, stdout, stderr).await
            }
        }
    }
}
