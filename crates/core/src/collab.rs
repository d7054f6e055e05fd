use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::warn;

use crate::model::{ChangeKind, Entry, EntryId, EntryNode};

/// Resolves the opaque type hint stored in `Entry::kind`.
pub trait KindLookup: Send + Sync {
    fn lookup_kind(&self, path: &Path) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionKindLookup;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rs", "py", "toml", "json", "yaml", "yml", "csv", "html", "css", "js", "ts",
    "c", "h", "cpp", "sh", "xml", "ini", "log",
];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "svg", "webp", "ico"];

impl KindLookup for ExtensionKindLookup {
    fn lookup_kind(&self, path: &Path) -> String {
        if path.is_dir() {
            return "inode-directory".to_string();
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        let kind = if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            "text-x-generic"
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            "image-x-generic"
        } else {
            "application-x-generic"
        };
        kind.to_string()
    }
}

/// Fire-and-forget launches into the desktop environment.
pub trait ExternalOpener: Send + Sync {
    fn open_externally(&self, path: &Path) -> io::Result<()>;
    fn reveal_externally(&self, path: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl ExternalOpener for SystemOpener {
    fn open_externally(&self, path: &Path) -> io::Result<()> {
        let program = if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        spawn_detached(Command::new(program).arg(path))
    }

    fn reveal_externally(&self, path: &Path) -> io::Result<()> {
        let mut command = if cfg!(target_os = "windows") {
            let mut command = Command::new("explorer");
            command.arg(format!("/select,{}", path.display()));
            command
        } else if cfg!(target_os = "macos") {
            let mut command = Command::new("open");
            command.arg("-R").arg(path);
            command
        } else {
            let mut command = Command::new("xdg-open");
            command.arg(path.parent().unwrap_or(path));
            command
        };
        spawn_detached(&mut command)
    }
}

fn spawn_detached(command: &mut Command) -> io::Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

/// Opens an entry, plus its counterpart for changed entries and directory
/// placeholders that carry one.
pub fn open_entry(opener: &dyn ExternalOpener, entry: &Entry) -> io::Result<()> {
    opener.open_externally(&entry.path)?;
    if let Some(alternate) = counterpart(entry) {
        if let Err(err) = opener.open_externally(alternate) {
            warn!("failed to open {}: {}", alternate.display(), err);
        }
    }
    Ok(())
}

pub fn reveal_entry(opener: &dyn ExternalOpener, entry: &Entry) -> io::Result<()> {
    opener.reveal_externally(&entry.path)?;
    if let Some(alternate) = counterpart(entry) {
        if let Err(err) = opener.reveal_externally(alternate) {
            warn!("failed to reveal {}: {}", alternate.display(), err);
        }
    }
    Ok(())
}

fn counterpart(entry: &Entry) -> Option<&Path> {
    match entry.change {
        ChangeKind::Changed | ChangeKind::Unknown => entry.alternate_path.as_deref(),
        _ => None,
    }
}

/// Callbacks invoked from the scan worker. Implementations marshal back to
/// their own UI context and must not call into the session synchronously.
pub trait PresentationSink: Send + Sync {
    fn on_entry_discovered(&self, _id: EntryId, _node: &EntryNode) {}
    fn on_directory_discovered(&self, _id: EntryId, _node: &EntryNode, _parent: Option<EntryId>) {
    }
    fn on_scan_progress(&self, _path: &Path) {}
    fn on_scan_finished(&self, _has_changes: bool) {}
    fn on_scan_invalid(&self) {}
    fn on_scan_cancelled(&self) {}
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::{open_entry, ExtensionKindLookup, ExternalOpener, KindLookup};
    use crate::model::{ChangeKind, Entry};

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<PathBuf>>,
    }

    impl ExternalOpener for RecordingOpener {
        fn open_externally(&self, path: &Path) -> io::Result<()> {
            self.opened
                .lock()
                .expect("lock")
                .push(path.to_path_buf());
            Ok(())
        }

        fn reveal_externally(&self, _path: &Path) -> io::Result<()> {
            Ok(())
        }
    }

    fn entry(change: ChangeKind) -> Entry {
        Entry {
            name: "a.txt".to_string(),
            path: PathBuf::from("/l/a.txt"),
            alternate_path: Some(PathBuf::from("/r/a.txt")),
            relative_path: PathBuf::from("a.txt"),
            kind: "text-x-generic".to_string(),
            change,
            is_dir: false,
            visible: true,
            error: None,
        }
    }

    #[test]
    fn changed_entries_open_both_sides() {
        let opener = RecordingOpener::default();
        open_entry(&opener, &entry(ChangeKind::Changed)).expect("open");
        open_entry(&opener, &entry(ChangeKind::LeftOnly)).expect("open");

        let opened = opener.opened.lock().expect("lock");
        assert_eq!(
            *opened,
            vec![
                PathBuf::from("/l/a.txt"),
                PathBuf::from("/r/a.txt"),
                PathBuf::from("/l/a.txt"),
            ]
        );
    }

    #[test]
    fn extension_lookup_distinguishes_directories() {
        let temp = TempDir::new().expect("tempdir");
        let lookup = ExtensionKindLookup;
        assert_eq!(lookup.lookup_kind(temp.path()), "inode-directory");
        assert_eq!(
            lookup.lookup_kind(&temp.path().join("notes.MD")),
            "text-x-generic"
        );
        assert_eq!(
            lookup.lookup_kind(&temp.path().join("archive.tar")),
            "application-x-generic"
        );
    }
}
