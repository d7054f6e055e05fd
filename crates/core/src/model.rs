use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compare::CompareMethod;

pub const REPORT_VERSION: &str = "1.0.0";

pub type EntryId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Unchanged,
    Changed,
    LeftOnly,
    RightOnly,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// One classified filesystem node surfaced in a comparison result.
///
/// `path` is the side considered primary for the entry: the left side for
/// changed, left-only and unchanged entries, the right side for right-only
/// entries. `alternate_path` points at the matching location on the other
/// side, whether or not it exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub alternate_path: Option<PathBuf>,
    pub relative_path: PathBuf,
    pub kind: String,
    pub change: ChangeKind,
    pub is_dir: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_visible() -> bool {
    true
}

impl Entry {
    /// Returns `(left, right)` locations for entries that carry both sides.
    pub fn side_paths(&self) -> Option<(&Path, &Path)> {
        let alternate = self.alternate_path.as_deref()?;
        match self.change {
            ChangeKind::Changed | ChangeKind::LeftOnly => Some((self.path.as_path(), alternate)),
            ChangeKind::RightOnly => Some((alternate, self.path.as_path())),
            ChangeKind::Unchanged | ChangeKind::Unknown => None,
        }
    }
}

/// Nested, id-carrying view of a result subtree. `children` is `None` for
/// files and `Some` (possibly empty) for directories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryNode {
    pub id: EntryId,
    pub entry: Entry,
    #[serde(default)]
    pub children: Option<Vec<EntryNode>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChangeCounts {
    #[serde(default)]
    pub unchanged: u64,
    #[serde(default)]
    pub changed: u64,
    #[serde(default)]
    pub left_only: u64,
    #[serde(default)]
    pub right_only: u64,
    #[serde(default)]
    pub unknown: u64,
}

impl ChangeCounts {
    pub fn record(&mut self, kind: ChangeKind) {
        let slot = match kind {
            ChangeKind::Unchanged => &mut self.unchanged,
            ChangeKind::Changed => &mut self.changed,
            ChangeKind::LeftOnly => &mut self.left_only,
            ChangeKind::RightOnly => &mut self.right_only,
            ChangeKind::Unknown => &mut self.unknown,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn differences(&self) -> u64 {
        self.changed
            .saturating_add(self.left_only)
            .saturating_add(self.right_only)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanMessage {
    pub seq: u64,
    pub scan_id: String,
    pub timestamp: String,
    pub event: ScanEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        left: PathBuf,
        right: PathBuf,
    },
    Progress {
        path: PathBuf,
    },
    EntryDiscovered {
        id: EntryId,
        parent: Option<EntryId>,
        node: EntryNode,
    },
    DirectoryDiscovered {
        id: EntryId,
        parent: Option<EntryId>,
        node: EntryNode,
    },
    Finished {
        has_changes: bool,
        counts: ChangeCounts,
    },
    Invalid {
        reason: String,
    },
    Cancelled,
    Resolving {
        id: EntryId,
        path: PathBuf,
    },
    Resolved {
        id: EntryId,
    },
    ResolveFailed {
        id: EntryId,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonReport {
    pub report_version: String,
    pub generated_at: String,
    pub scan_id: String,
    pub left_root: String,
    pub right_root: String,
    pub include_unchanged: bool,
    #[serde(default)]
    pub compare_method: CompareMethod,
    #[serde(default)]
    pub ignore: Vec<String>,
    pub has_changes: bool,
    pub counts: ChangeCounts,
    #[serde(default)]
    pub elapsed_ms: u64,
    pub entries: Vec<EntryNode>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
