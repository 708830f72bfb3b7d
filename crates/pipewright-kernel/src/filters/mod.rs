//! Sample filters shipped with pipewright.
//!
//! They double as worked examples of the two filter flavours: `CountLines`,
//! `CaptureText` and `PassThrough` stream, `CaptureLines` and `MountFilter`
//! take pre-split lines.

mod capture;
mod count_lines;
mod mounts;
mod passthrough;

pub use capture::{CaptureLines, CaptureText};
pub use count_lines::CountLines;
pub use mounts::{MountEntry, MountFilter, MountLayout, MOUNT_FS_TYPES};
pub use passthrough::PassThrough;
