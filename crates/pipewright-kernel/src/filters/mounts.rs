//! MountFilter — keep the mount table lines for real block/network filesystems.
//!
//! Fields are read at fixed whitespace-separated positions; there is no
//! parsing beyond that. A line laid out differently than the chosen layout
//! yields nonsense fields rather than an error, and a line too short for the
//! layout is dropped.

use std::io;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::{FilterOutput, LineFilter};

/// Filesystem types the filter keeps.
pub const MOUNT_FS_TYPES: &[&str] = &[
    "ext2", "ext3", "ext4", "nfs", "ntfs", "btrfs", "fat", "vfat", "exfat",
];

/// Field positions of a mount table line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountLayout {
    /// `/proc/mounts` / fstab: `dev mountpoint type options ...`
    #[default]
    Table,
    /// `mount` output: `dev on mountpoint type fstype (options)`
    Command,
}

impl MountLayout {
    /// Positions of (device, mountpoint, type, options).
    fn positions(&self) -> [usize; 4] {
        match self {
            MountLayout::Table => [0, 1, 2, 3],
            MountLayout::Command => [0, 2, 4, 5],
        }
    }

    /// Split `line` and pick the four fields, if it has enough of them.
    pub fn parse(&self, line: &str) -> Option<MountEntry> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [dev, mp, ty, opts] = self.positions();
        Some(MountEntry {
            device: fields.get(dev)?.to_string(),
            mountpoint: fields.get(mp)?.to_string(),
            fs_type: fields.get(ty)?.to_string(),
            options: fields.get(opts)?.to_string(),
        })
    }
}

/// One kept mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub device: String,
    pub mountpoint: String,
    pub fs_type: String,
    /// Options field as written, e.g. `rw,relatime` or `(rw,relatime)`.
    pub options: String,
}

/// Passes through mount lines whose type is in [`MOUNT_FS_TYPES`] and
/// records them.
#[derive(Debug, Default, Clone)]
pub struct MountFilter {
    layout: MountLayout,
    mounts: Vec<MountEntry>,
}

impl MountFilter {
    pub fn new(layout: MountLayout) -> Self {
        Self {
            layout,
            mounts: Vec::new(),
        }
    }

    pub fn layout(&self) -> MountLayout {
        self.layout
    }

    /// Mounts kept by the last run, in input order.
    pub fn mounts(&self) -> &[MountEntry] {
        &self.mounts
    }
}

#[async_trait]
impl LineFilter for MountFilter {
    async fn process(
        &mut self,
        lines: Vec<String>,
        stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        self.mounts.clear();
        for line in lines {
            let Some(entry) = self.layout.parse(&line) else {
                tracing::trace!(line = %line.trim_end(), "mount line too short, skipped");
                continue;
            };
            if MOUNT_FS_TYPES.contains(&entry.fs_type.as_str()) {
                stdout.write_str(&line).await?;
                self.mounts.push(entry);
            }
        }
        Ok(())
    }
}
