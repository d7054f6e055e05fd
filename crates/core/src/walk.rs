use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::collab::KindLookup;
use crate::compare::{LevelComparison, PathComparator};
use crate::error::{CompareError, ScanError};
use crate::model::{ChangeCounts, ChangeKind, Entry, Side};

/// A walked entry together with its subtree. Directories always carry
/// `Some(children)`, files carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkNode {
    pub entry: Entry,
    pub children: Option<Vec<WalkNode>>,
}

impl WalkNode {
    pub fn is_dir(&self) -> bool {
        self.children.is_some()
    }

    /// Number of entries in this subtree, including this one.
    pub fn len(&self) -> usize {
        1 + self
            .children
            .iter()
            .flatten()
            .map(WalkNode::len)
            .sum::<usize>()
    }
}

pub fn find_node<'n>(nodes: &'n [WalkNode], relative: &Path) -> Option<&'n WalkNode> {
    for node in nodes {
        if node.entry.relative_path == relative {
            return Some(node);
        }
        if let Some(children) = &node.children {
            if let Some(found) = find_node(children, relative) {
                return Some(found);
            }
        }
    }
    None
}

/// Receives top-level results as soon as they are known. Entries below the
/// top level arrive inside their directory's `children`.
pub trait WalkSink {
    fn entry_discovered(&mut self, node: WalkNode);
    fn directory_discovered(&mut self, node: WalkNode);
    fn progress(&mut self, _path: &Path) {}
}

impl WalkSink for Vec<WalkNode> {
    fn entry_discovered(&mut self, node: WalkNode) {
        self.push(node);
    }

    fn directory_discovered(&mut self, node: WalkNode) {
        self.push(node);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkOutcome {
    pub has_changes: bool,
    pub counts: ChangeCounts,
    pub directories: u64,
    pub warnings: Vec<String>,
}

struct WalkState<'s> {
    sink: &'s mut dyn WalkSink,
    left_root: &'s Path,
    right_root: &'s Path,
    outcome: WalkOutcome,
}

impl WalkState<'_> {
    fn place(&mut self, node: WalkNode, emit: bool, collected: &mut Vec<WalkNode>) {
        if !emit {
            collected.push(node);
        } else if node.is_dir() {
            self.sink.directory_discovered(node);
        } else {
            self.sink.entry_discovered(node);
        }
    }
}

pub struct TreeWalker<'a> {
    comparator: &'a PathComparator,
    kinds: &'a dyn KindLookup,
    include_unchanged: bool,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(comparator: &'a PathComparator, kinds: &'a dyn KindLookup) -> Self {
        Self {
            comparator,
            kinds,
            include_unchanged: false,
            cancel_flag: None,
        }
    }

    pub fn include_unchanged(mut self, include_unchanged: bool) -> Self {
        self.include_unchanged = include_unchanged;
        self
    }

    pub fn cancel_flag(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(cancel_flag);
        self
    }

    /// Walks both trees depth first. Files of a level are reported before its
    /// subdirectories; a subdirectory present on both sides is kept only when
    /// something below it is worth showing.
    pub fn walk(
        &self,
        left_root: &Path,
        right_root: &Path,
        sink: &mut dyn WalkSink,
    ) -> Result<WalkOutcome, ScanError> {
        info!(
            "walking {} <-> {} (include_unchanged={}, method={:?})",
            left_root.display(),
            right_root.display(),
            self.include_unchanged,
            self.comparator.method()
        );

        sink.progress(left_root);
        let level = self
            .comparator
            .compare(left_root, right_root)
            .map_err(root_error)?;

        let mut state = WalkState {
            sink,
            left_root,
            right_root,
            outcome: WalkOutcome::default(),
        };
        let (has_changes, _) = self.walk_level(&mut state, &level, Path::new(""), true)?;
        state.outcome.has_changes = has_changes;

        info!(
            "walk finished: changes={} changed={} left_only={} right_only={} unknown={}",
            has_changes,
            state.outcome.counts.changed,
            state.outcome.counts.left_only,
            state.outcome.counts.right_only,
            state.outcome.counts.unknown
        );
        Ok(state.outcome)
    }

    fn walk_level(
        &self,
        state: &mut WalkState<'_>,
        level: &LevelComparison,
        relative_dir: &Path,
        emit: bool,
    ) -> Result<(bool, Vec<WalkNode>), ScanError> {
        self.check_cancelled()?;

        let mut changed = false;
        let mut collected = Vec::new();

        let files = [
            (&level.diff_files, ChangeKind::Changed),
            (&level.left_only_files, ChangeKind::LeftOnly),
            (&level.right_only_files, ChangeKind::RightOnly),
        ];
        for (names, kind) in files {
            for name in names {
                let in_left = kind != ChangeKind::RightOnly;
                let entry = self.entry(level, relative_dir, name, kind, false, in_left);
                state.outcome.counts.record(kind);
                state.place(
                    WalkNode {
                        entry,
                        children: None,
                    },
                    emit,
                    &mut collected,
                );
                changed = true;
            }
        }

        if self.include_unchanged {
            for name in &level.same_files {
                let entry =
                    self.entry(level, relative_dir, name, ChangeKind::Unchanged, false, true);
                state.outcome.counts.record(ChangeKind::Unchanged);
                state.place(
                    WalkNode {
                        entry,
                        children: None,
                    },
                    emit,
                    &mut collected,
                );
                changed = true;
            }
        }

        for failure in &level.errors {
            warn!(
                "could not compare {}: {}",
                relative_dir.join(&failure.name).display(),
                failure.reason
            );
            state.outcome.warnings.push(format!(
                "could not compare {}: {}",
                relative_dir.join(&failure.name).display(),
                failure.reason
            ));
            let mut entry = self.entry(
                level,
                relative_dir,
                &failure.name,
                ChangeKind::Unknown,
                false,
                failure.in_left,
            );
            entry.error = Some(failure.reason.clone());
            state.outcome.counts.record(ChangeKind::Unknown);
            state.place(
                WalkNode {
                    entry,
                    children: None,
                },
                emit,
                &mut collected,
            );
            changed = true;
        }

        for pair in &level.subdirs {
            self.check_cancelled()?;

            let (kind, side) = match (pair.in_left, pair.in_right) {
                (true, true) => (ChangeKind::Unknown, None),
                (true, false) => (ChangeKind::LeftOnly, Some(Side::Left)),
                (false, true) => (ChangeKind::RightOnly, Some(Side::Right)),
                (false, false) => continue,
            };
            let left_dir = level.left.join(&pair.name);
            let right_dir = level.right.join(&pair.name);
            let relative = relative_dir.join(&pair.name);

            let sub_level = match side {
                None => {
                    state.sink.progress(&left_dir);
                    self.comparator.compare(&left_dir, &right_dir)
                }
                Some(Side::Left) => {
                    state.sink.progress(&left_dir);
                    self.comparator
                        .compare_one_side(&left_dir, &right_dir, Side::Left)
                }
                Some(Side::Right) => {
                    state.sink.progress(&right_dir);
                    self.comparator
                        .compare_one_side(&right_dir, &left_dir, Side::Right)
                }
            };

            let sub_level = match sub_level {
                Ok(sub_level) => sub_level,
                Err(err) => {
                    ensure_roots_readable(state.left_root, state.right_root)?;
                    warn!("could not scan {}: {}", relative.display(), err);
                    state
                        .outcome
                        .warnings
                        .push(format!("could not scan {}: {}", relative.display(), err));
                    let mut entry = self.entry(
                        level,
                        relative_dir,
                        &pair.name,
                        ChangeKind::Unknown,
                        true,
                        pair.in_left,
                    );
                    entry.error = Some(err.to_string());
                    state.outcome.counts.record(ChangeKind::Unknown);
                    state.place(
                        WalkNode {
                            entry,
                            children: Some(Vec::new()),
                        },
                        emit,
                        &mut collected,
                    );
                    changed = true;
                    continue;
                }
            };

            let (sub_changed, children) = self.walk_level(state, &sub_level, &relative, false)?;
            if kind == ChangeKind::Unknown && !sub_changed {
                debug!("pruned identical directory {}", relative.display());
                continue;
            }

            let entry = self.entry(level, relative_dir, &pair.name, kind, true, pair.in_left);
            if kind != ChangeKind::Unknown {
                state.outcome.counts.record(kind);
            }
            state.outcome.directories += 1;
            state.place(
                WalkNode {
                    entry,
                    children: Some(children),
                },
                emit,
                &mut collected,
            );
            changed = true;
        }

        Ok((changed, collected))
    }

    fn entry(
        &self,
        level: &LevelComparison,
        relative_dir: &Path,
        name: &str,
        change: ChangeKind,
        is_dir: bool,
        in_left: bool,
    ) -> Entry {
        let left = level.left.join(name);
        let right = level.right.join(name);
        let (path, alternate_path) = match change {
            ChangeKind::Changed | ChangeKind::LeftOnly => (left, Some(right)),
            ChangeKind::RightOnly => (right, Some(left)),
            ChangeKind::Unchanged => (left, None),
            ChangeKind::Unknown if in_left => (left, None),
            ChangeKind::Unknown => (right, None),
        };

        Entry {
            name: name.to_string(),
            kind: self.kinds.lookup_kind(&path),
            path,
            alternate_path,
            relative_path: relative_dir.join(name),
            change,
            is_dir,
            visible: true,
            error: None,
        }
    }

    fn check_cancelled(&self) -> Result<(), ScanError> {
        if self
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(ScanError::Cancelled);
        }
        Ok(())
    }
}

fn root_error(err: CompareError) -> ScanError {
    match err {
        CompareError::NotFound(path) => ScanError::NotFound(path),
        other => ScanError::InvalidScan {
            path: other.path().to_path_buf(),
            reason: other.to_string(),
        },
    }
}

fn ensure_roots_readable(left_root: &Path, right_root: &Path) -> Result<(), ScanError> {
    for root in [left_root, right_root] {
        if let Err(err) = fs::read_dir(root) {
            return Err(ScanError::InvalidScan {
                path: PathBuf::from(root),
                reason: format!("root became inaccessible: {err}"),
            });
        }
    }
    Ok(())
}
