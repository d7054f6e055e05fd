use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{ChangeKind, EntryId};

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("directory not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CompareError {
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) | Self::NotADirectory(path) | Self::Io { path, .. } => path,
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("comparison root not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("scan aborted at {}: {reason}", path.display())]
    InvalidScan { path: PathBuf, reason: String },

    #[error("scan cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveErrorKind {
    PermissionDenied,
    AlreadyExists,
    SourceVanished,
    Io,
}

#[derive(Error, Debug)]
#[error("{kind:?} at {}: {message}", path.display())]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    pub path: PathBuf,
    pub message: String,
}

impl ResolveError {
    pub fn new(
        kind: ResolveErrorKind,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn from_io(err: &io::Error, path: &Path) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::PermissionDenied => ResolveErrorKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => ResolveErrorKind::AlreadyExists,
            _ => ResolveErrorKind::Io,
        };
        Self::new(kind, path, err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidResolution {
    #[error("entries classified {0:?} cannot be resolved")]
    Unresolvable(ChangeKind),

    #[error("{0:?} entries can only be copied from the side where they exist")]
    WrongSide(ChangeKind),

    #[error("cannot resolve while a scan is running")]
    ScanInProgress,

    #[error("entry {0} is already being resolved")]
    AlreadyResolving(EntryId),

    #[error("entry {0} is not part of the current result")]
    UnknownEntry(EntryId),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a scan or resolution is already running")]
    Busy,

    #[error("both comparison roots must be configured before scanning")]
    MissingRoots,

    #[error(transparent)]
    InvalidResolution(#[from] InvalidResolution),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::Path;

    use super::{ResolveError, ResolveErrorKind};

    #[test]
    fn io_errors_map_to_resolve_kinds() {
        let path = Path::new("/tmp/x");
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let exists = io::Error::new(io::ErrorKind::AlreadyExists, "exists");
        let other = io::Error::new(io::ErrorKind::Other, "disk full");

        assert_eq!(
            ResolveError::from_io(&denied, path).kind,
            ResolveErrorKind::PermissionDenied
        );
        assert_eq!(
            ResolveError::from_io(&exists, path).kind,
            ResolveErrorKind::AlreadyExists
        );
        let mapped = ResolveError::from_io(&other, path);
        assert_eq!(mapped.kind, ResolveErrorKind::Io);
        assert!(mapped.message.contains("disk full"));
    }
}
