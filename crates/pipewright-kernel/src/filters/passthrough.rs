//! PassThrough — copy input to output untouched.

use std::io;

use async_trait::async_trait;

use crate::filter::{Filter, FilterInput, FilterOutput};

/// Streams its input to its output byte for byte and counts the bytes.
#[derive(Debug, Default, Clone)]
pub struct PassThrough {
    bytes: u64,
}

impl PassThrough {
    /// Bytes copied by the last run.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

#[async_trait]
impl Filter for PassThrough {
    async fn process(
        &mut self,
        stdin: &mut FilterInput,
        stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        self.bytes = tokio::io::copy(stdin, stdout).await?;
        Ok(())
    }
}
