//! Chains: stages linked with `|`.
//!
//! A chain keeps its stages in an arena. Each record knows the index of the
//! stage before and after it, so the links are plain indices and never own
//! anything. A `Chain` value also remembers which stage it stands for (its
//! cursor): `a | b | c` evaluates to the chain seen from `c`, and
//! `execute` walks back from there to find where to start.
//!
//! ```text
//!   Stage::sh("ls") | Stage::filter(CountLines::default())
//!
//!   records: [0] ls ──next──▶ [1] CountLines
//!                 ◀──prev───
//!   cursor:  1
//! ```

use std::fmt;
use std::ops::BitOr;

use crate::config::EngineConfig;
use crate::stage::Stage;

/// Index of a stage within its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub(crate) usize);

impl StageId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) struct StageRecord {
    pub(crate) stage: Stage,
    pub(crate) next: Option<StageId>,
    pub(crate) prev: Option<StageId>,
}

/// A pipeline of linked stages.
pub struct Chain {
    pub(crate) records: Vec<StageRecord>,
    pub(crate) cursor: StageId,
    pub(crate) exit_status: Option<i32>,
    pub(crate) config: EngineConfig,
}

impl From<Stage> for Chain {
    fn from(stage: Stage) -> Self {
        Self {
            records: vec![StageRecord {
                stage,
                next: None,
                prev: None,
            }],
            cursor: StageId(0),
            exit_status: None,
            config: EngineConfig::default(),
        }
    }
}

impl Chain {
    /// Replace the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The stage this chain value stands for.
    pub fn cursor(&self) -> StageId {
        self.cursor
    }

    /// Exit status of the last run; `None` before the first run or after a
    /// failed one.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    pub fn next_of(&self, id: StageId) -> Option<StageId> {
        self.records.get(id.0).and_then(|r| r.next)
    }

    pub fn prev_of(&self, id: StageId) -> Option<StageId> {
        self.records.get(id.0).and_then(|r| r.prev)
    }

    /// Walk `prev` links from `id` to the first stage.
    pub fn find_head(&self, id: StageId) -> StageId {
        let mut current = id;
        while let Some(prev) = self.prev_of(current) {
            current = prev;
        }
        current
    }

    /// The first stage of the chain.
    pub fn head(&self) -> StageId {
        self.find_head(self.cursor)
    }

    /// The last stage of the chain.
    pub fn tail(&self) -> StageId {
        let mut current = self.cursor;
        while let Some(next) = self.next_of(current) {
            current = next;
        }
        current
    }

    /// Stage ids in pipeline order, head first.
    pub fn stage_ids(&self) -> Vec<StageId> {
        let mut ids = Vec::with_capacity(self.records.len());
        let mut current = Some(self.head());
        while let Some(id) = current {
            ids.push(id);
            current = self.next_of(id);
        }
        ids
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.records.get(id.0).map(|r| &r.stage)
    }

    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.records.get_mut(id.0).map(|r| &mut r.stage)
    }

    /// The filter at the cursor, as `T`.
    ///
    /// For `(a | b | Stage::filter(CaptureText::default()))` this is the
    /// capture.
    pub fn filter<T: 'static>(&self) -> Option<&T> {
        self.stage(self.cursor)?.downcast_ref()
    }

    /// The first filter of type `T`, head first.
    pub fn find<T: 'static>(&self) -> Option<&T> {
        self.stage_ids()
            .into_iter()
            .find_map(|id| self.stage(id)?.downcast_ref::<T>())
    }

    /// Every filter of type `T`, head first.
    pub fn find_all<T: 'static>(&self) -> Vec<&T> {
        self.stage_ids()
            .into_iter()
            .filter_map(|id| self.stage(id)?.downcast_ref::<T>())
            .collect()
    }

    /// Mutable access to the first filter of type `T`.
    pub fn find_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let id = self
            .stage_ids()
            .into_iter()
            .find(|id| self.stage(*id).and_then(|s| s.downcast_ref::<T>()).is_some())?;
        self.stage_mut(id)?.downcast_mut()
    }

    /// Set `from.next = to` and `to.prev = from`.
    ///
    /// An existing `from.next` is overwritten and the stage it pointed at
    /// keeps its stale `prev`. `BitOr` only links a tail to a head, so that
    /// can't happen through the public API.
    fn link(&mut self, from: StageId, to: StageId) {
        self.records[from.0].next = Some(to);
        self.records[to.0].prev = Some(from);
    }

    /// Append `right` after this chain's cursor.
    fn append(mut self, right: Chain) -> Chain {
        let offset = self.records.len();
        let shift = |id: Option<StageId>| id.map(|StageId(i)| StageId(i + offset));
        let right_head = StageId(right.head().0 + offset);
        let right_cursor = StageId(right.cursor.0 + offset);

        self.records
            .extend(right.records.into_iter().map(|r| StageRecord {
                stage: r.stage,
                next: shift(r.next),
                prev: shift(r.prev),
            }));

        let left_cursor = self.cursor;
        self.link(left_cursor, right_head);
        self.cursor = right_cursor;
        self.exit_status = None;
        self
    }
}

impl<R: Into<Chain>> BitOr<R> for Chain {
    type Output = Chain;

    fn bitor(self, rhs: R) -> Chain {
        self.append(rhs.into())
    }
}

impl<R: Into<Chain>> BitOr<R> for Stage {
    type Output = Chain;

    fn bitor(self, rhs: R) -> Chain {
        Chain::from(self).append(rhs.into())
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.stage_ids().into_iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            if let Some(stage) = self.stage(id) {
                write!(f, "{stage}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("pipeline", &self.to_string())
            .field("cursor", &self.cursor)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}
