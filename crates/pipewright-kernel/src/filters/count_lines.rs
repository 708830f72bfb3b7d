//! CountLines — count input lines, like `wc -l` but in-process.

use std::io;

use async_trait::async_trait;

use crate::filter::{Filter, FilterInput, FilterOutput};

/// Counts its input lines and writes the count followed by a newline.
///
/// A final line without a terminator still counts. The count stays
/// available through [`CountLines::count`] after the run.
#[derive(Debug, Default, Clone)]
pub struct CountLines {
    count: usize,
}

impl CountLines {
    /// Lines seen by the last run.
    pub fn count(&self) -> usize {
        self.count
    }
}

#[async_trait]
impl Filter for CountLines {
    async fn process(
        &mut self,
        stdin: &mut FilterInput,
        stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        self.count = 0;
        while stdin.next_line().await?.is_some() {
            self.count += 1;
        }
        stdout.write_str(&format!("{}\n", self.count)).await
    }
}
