//! CaptureText / CaptureLines — keep a pipeline's output for the host.
//!
//! Both write nothing, so they belong at the end of a chain.

use std::io;

use async_trait::async_trait;

use crate::filter::{Filter, FilterInput, FilterOutput, LineFilter};

/// Reads all input as text and keeps it.
#[derive(Debug, Default, Clone)]
pub struct CaptureText {
    text: String,
}

impl CaptureText {
    /// Everything the stage read, exactly as received.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[async_trait]
impl Filter for CaptureText {
    async fn process(
        &mut self,
        stdin: &mut FilterInput,
        _stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        self.text = stdin.read_text().await?;
        tracing::trace!(bytes = self.text.len(), "captured text");
        Ok(())
    }
}

/// Keeps the input as a list of lines, terminators included.
#[derive(Debug, Default, Clone)]
pub struct CaptureLines {
    lines: Vec<String>,
}

impl CaptureLines {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

#[async_trait]
impl LineFilter for CaptureLines {
    async fn process(
        &mut self,
        lines: Vec<String>,
        _stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        self.lines = lines;
        Ok(())
    }
}
