//! pipewright-kernel: Unix-style pipelines of shell commands and in-process
//! filters.
//!
//! This crate provides:
//!
//! - **Stages**: external shell commands and user filters, with per-stage
//!   working directory, text encoding and buffer size
//! - **Chains**: stages linked with `|`, inspected by filter type after a run
//! - **Engine**: head-first startup, reverse-order join, last-stage-wins exit
//!   status
//! - **Scheduler**: the bounded in-process pipe and the filter worker tasks
//! - **Filters**: sample filters (`CountLines`, `CaptureText`, `CaptureLines`,
//!   `MountFilter`, `PassThrough`)
//!
//! ```ignore
//! use pipewright_kernel::{filters::CountLines, Stage};
//!
//! let mut chain = Stage::sh("ls /etc") | Stage::filter(CountLines::default());
//! chain.execute().await?;
//! println!("{} entries", chain.filter::<CountLines>().unwrap().count());
//! ```

pub mod chain;
pub mod config;
pub mod encoding;
mod engine;
pub mod error;
pub mod filter;
pub mod filters;
pub mod io;
pub mod scheduler;
pub mod stage;

pub use chain::{Chain, StageId};
pub use config::EngineConfig;
pub use encoding::Encoding;
pub use engine::exit_code;
pub use error::{PipelineError, Result};
pub use filter::{Filter, FilterInput, FilterOutput, LineFilter};
pub use io::{InputMode, StageInput};
pub use stage::{ExternalCommand, Stage, StageOptions};

// Filter implementors need the same macro the traits are declared with.
pub use async_trait::async_trait;
