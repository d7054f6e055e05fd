use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::model::{ChangeCounts, ChangeKind, Entry, EntryId, EntryNode};
use crate::walk::WalkNode;

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    parent: Option<EntryId>,
    children: Option<Vec<EntryId>>,
}

/// Arena holding the materialized result of a scan. Ids are never reused,
/// not even across `clear`, so a stale id simply stops resolving.
#[derive(Debug, Clone, Default)]
pub struct ResultTree {
    slots: HashMap<EntryId, Slot>,
    roots: Vec<EntryId>,
    by_path: HashMap<PathBuf, EntryId>,
    next_id: EntryId,
}

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a walked subtree below `parent` (or at the top level) and
    /// returns the id of its root.
    pub fn insert(&mut self, node: WalkNode, parent: Option<EntryId>) -> EntryId {
        self.next_id += 1;
        let id = self.next_id;

        let WalkNode { entry, children } = node;
        let parent = match parent {
            Some(parent_id) => match self.slots.get_mut(&parent_id) {
                Some(Slot {
                    children: Some(siblings),
                    ..
                }) => {
                    siblings.push(id);
                    Some(parent_id)
                }
                _ => {
                    debug!("parent {} missing, inserting {} at top level", parent_id, id);
                    self.roots.push(id);
                    None
                }
            },
            None => {
                self.roots.push(id);
                None
            }
        };

        self.by_path.insert(entry.path.clone(), id);
        if let Some(alternate) = &entry.alternate_path {
            self.by_path.insert(alternate.clone(), id);
        }
        self.slots.insert(
            id,
            Slot {
                entry,
                parent,
                children: children.as_ref().map(|nodes| Vec::with_capacity(nodes.len())),
            },
        );

        for child in children.into_iter().flatten() {
            self.insert(child, Some(id));
        }
        id
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.slots.get(&id).map(|slot| &slot.entry)
    }

    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.slots.get(&id).and_then(|slot| slot.parent)
    }

    pub fn children(&self, id: EntryId) -> Option<&[EntryId]> {
        self.slots.get(&id)?.children.as_deref()
    }

    pub fn roots(&self) -> &[EntryId] {
        &self.roots
    }

    /// Looks an entry up by either of its two absolute locations.
    pub fn find_by_path(&self, path: &Path) -> Option<EntryId> {
        self.by_path.get(path).copied()
    }

    pub fn find_by_relative_path(&self, relative: &Path) -> Option<EntryId> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.entry.relative_path == relative)
            .map(|(id, _)| *id)
    }

    /// Drops an entry and everything below it. Siblings keep their order.
    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        let parent = self.slots.get(&id)?.parent;
        match parent {
            Some(parent_id) => {
                if let Some(siblings) = self
                    .slots
                    .get_mut(&parent_id)
                    .and_then(|slot| slot.children.as_mut())
                {
                    siblings.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }

        let mut entry = self.drop_subtree(id)?;
        entry.visible = false;
        Some(entry)
    }

    fn drop_subtree(&mut self, id: EntryId) -> Option<Entry> {
        let slot = self.slots.remove(&id)?;
        self.by_path.remove(&slot.entry.path);
        if let Some(alternate) = &slot.entry.alternate_path {
            self.by_path.remove(alternate);
        }
        for child in slot.children.iter().flatten() {
            self.drop_subtree(*child);
        }
        Some(slot.entry)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.roots.clear();
        self.by_path.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn node(&self, id: EntryId) -> Option<EntryNode> {
        let slot = self.slots.get(&id)?;
        let children = slot
            .children
            .as_ref()
            .map(|ids| ids.iter().filter_map(|child| self.node(*child)).collect());
        Some(EntryNode {
            id,
            entry: slot.entry.clone(),
            children,
        })
    }

    pub fn snapshot(&self) -> Vec<EntryNode> {
        self.roots.iter().filter_map(|id| self.node(*id)).collect()
    }

    /// Tallies entries per change kind. Directory placeholders that only
    /// group changes below them are not counted.
    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for slot in self.slots.values() {
            let entry = &slot.entry;
            if entry.change == ChangeKind::Unknown && entry.is_dir && entry.error.is_none() {
                continue;
            }
            counts.record(entry.change);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::ResultTree;
    use crate::model::{ChangeKind, Entry};
    use crate::walk::WalkNode;

    fn entry(relative: &str, change: ChangeKind, is_dir: bool) -> Entry {
        let (path, alternate_path) = match change {
            ChangeKind::RightOnly => (
                Path::new("/r").join(relative),
                Some(Path::new("/l").join(relative)),
            ),
            ChangeKind::Unknown | ChangeKind::Unchanged => (Path::new("/l").join(relative), None),
            _ => (
                Path::new("/l").join(relative),
                Some(Path::new("/r").join(relative)),
            ),
        };
        Entry {
            name: relative.rsplit('/').next().unwrap_or(relative).to_string(),
            path,
            alternate_path,
            relative_path: PathBuf::from(relative),
            kind: String::new(),
            change,
            is_dir,
            visible: true,
            error: None,
        }
    }

    fn sample() -> WalkNode {
        WalkNode {
            entry: entry("src", ChangeKind::Unknown, true),
            children: Some(vec![
                WalkNode {
                    entry: entry("src/a.rs", ChangeKind::Changed, false),
                    children: None,
                },
                WalkNode {
                    entry: entry("src/b.rs", ChangeKind::RightOnly, false),
                    children: None,
                },
                WalkNode {
                    entry: entry("src/c.rs", ChangeKind::LeftOnly, false),
                    children: None,
                },
            ]),
        }
    }

    #[test]
    fn inserts_subtrees_with_parent_links() {
        let mut tree = ResultTree::new();
        let root = tree.insert(sample(), None);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots(), &[root]);
        let children = tree.children(root).expect("directory").to_vec();
        assert_eq!(children.len(), 3);
        for child in &children {
            assert_eq!(tree.parent(*child), Some(root));
        }
        assert_eq!(
            tree.find_by_path(Path::new("/l/src/b.rs")),
            Some(children[1])
        );
        assert_eq!(
            tree.find_by_path(Path::new("/r/src/b.rs")),
            Some(children[1])
        );
        assert_eq!(
            tree.find_by_relative_path(Path::new("src/a.rs")),
            Some(children[0])
        );

        let counts = tree.counts();
        assert_eq!(counts.changed, 1);
        assert_eq!(counts.right_only, 1);
        assert_eq!(counts.left_only, 1);
        assert_eq!(counts.unknown, 0);
    }

    #[test]
    fn remove_keeps_siblings_in_order() {
        let mut tree = ResultTree::new();
        let root = tree.insert(sample(), None);
        let children = tree.children(root).expect("directory").to_vec();

        let removed = tree.remove(children[1]).expect("removed");
        assert!(!removed.visible);
        assert_eq!(tree.children(root), Some(&[children[0], children[2]][..]));
        assert!(tree.find_by_path(Path::new("/r/src/b.rs")).is_none());
        assert!(tree.get(children[1]).is_none());

        tree.remove(root).expect("removed directory");
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
        assert!(tree.find_by_path(Path::new("/l/src/a.rs")).is_none());
    }

    #[test]
    fn ids_stay_unique_across_clear() {
        let mut tree = ResultTree::new();
        let first = tree.insert(sample(), None);
        tree.clear();
        assert!(tree.get(first).is_none());

        let second = tree.insert(sample(), None);
        assert!(second > first);
        assert!(tree.get(first).is_none());
    }

    #[test]
    fn snapshot_mirrors_structure() {
        let mut tree = ResultTree::new();
        tree.insert(sample(), None);
        tree.insert(
            WalkNode {
                entry: entry("top.txt", ChangeKind::Changed, false),
                children: None,
            },
            None,
        );

        let snapshot = tree.snapshot();
        assert_eq!(snapshot.len(), 2);
        let src_children = snapshot[0].children.as_ref().expect("directory");
        assert_eq!(src_children.len(), 3);
        assert_eq!(src_children[0].entry.name, "a.rs");
        assert!(snapshot[1].children.is_none());
    }
}
