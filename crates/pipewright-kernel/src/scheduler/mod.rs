//! Scheduler for pipewright — the moving parts under a running chain.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Chain                               │
//! │  ┌────────────┐  OS pipe  ┌────────────┐ PipeStream ┌──────────┐ │
//! │  │ sh -c cmd1 │──────────▶│ filter task│───────────▶│sh -c cmd2│ │
//! │  │  (child)   │  stdout   │  (worker)  │  + pump    │ (child)  │ │
//! │  └────────────┘           └────────────┘            └──────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **PipeStream**: bounded in-process pipe after every filter stage.
//! - **PipeMeter**: traffic counters on a pipe, kept by the engine for logs.
//! - **FilterWorker**: the task a filter runs on, created fresh per run.

mod pipe_stream;
mod worker;

pub use pipe_stream::{pipe_stream, PipeMeter, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
pub(crate) use worker::spawn_filter;
