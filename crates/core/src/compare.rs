use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, Metadata};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::classify;
use crate::config::CompareConfig;
use crate::error::CompareError;
use crate::model::{ChangeKind, Side};

/// Names skipped on both sides unless the configuration says otherwise.
pub const DEFAULT_IGNORES: &[&str] = &[
    "RCS",
    "CVS",
    "tags",
    ".git",
    ".hg",
    ".bzr",
    "_darcs",
    "__pycache__",
];

/// How two regular files with the same name are judged equal.
///
/// None of the methods is an exact byte comparison in every case: `Shallow`
/// trusts an identical size and mtime, `Metadata` never opens the files, and
/// even `Content` relies on BLAKE3 digests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompareMethod {
    /// Same size and mtime means equal; different size means changed;
    /// otherwise the contents are hashed.
    #[default]
    Shallow,
    /// Same size and mtimes within the configured tolerance means equal.
    Metadata,
    /// Always hash contents when the sizes match.
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdirPair {
    pub name: String,
    pub in_left: bool,
    pub in_right: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelError {
    pub name: String,
    pub in_left: bool,
    pub in_right: bool,
    pub reason: String,
}

/// Outcome of comparing exactly one directory level on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelComparison {
    pub left: PathBuf,
    pub right: PathBuf,
    pub same_files: Vec<String>,
    pub diff_files: Vec<String>,
    pub left_only_files: Vec<String>,
    pub right_only_files: Vec<String>,
    pub subdirs: Vec<SubdirPair>,
    pub errors: Vec<LevelError>,
}

impl LevelComparison {
    fn new(left: &Path, right: &Path) -> Self {
        Self {
            left: left.to_path_buf(),
            right: right.to_path_buf(),
            ..Self::default()
        }
    }

    fn push_file(&mut self, name: &str, kind: ChangeKind, in_left: bool, in_right: bool) {
        let name = name.to_string();
        match kind {
            ChangeKind::Unchanged => self.same_files.push(name),
            ChangeKind::Changed => self.diff_files.push(name),
            ChangeKind::LeftOnly => self.left_only_files.push(name),
            ChangeKind::RightOnly => self.right_only_files.push(name),
            ChangeKind::Unknown => self.errors.push(LevelError {
                name,
                in_left,
                in_right,
                reason: "pair could not be compared".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeType {
    File,
    Dir,
}

#[derive(Debug)]
enum Listed {
    Node(NodeType, Metadata),
    Unreadable(String),
}

#[derive(Debug)]
pub struct PathComparator {
    method: CompareMethod,
    mtime_tolerance: Duration,
    ignore: IgnoreMatcher,
}

impl PathComparator {
    pub fn new(method: CompareMethod) -> Self {
        let defaults = DEFAULT_IGNORES
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        let mut warnings = Vec::new();
        Self::with_ignore(method, 0, &defaults, &mut warnings)
    }

    pub fn with_ignore(
        method: CompareMethod,
        mtime_tolerance_secs: u64,
        ignore: &[String],
        warnings: &mut Vec<String>,
    ) -> Self {
        Self {
            method,
            mtime_tolerance: Duration::from_secs(mtime_tolerance_secs),
            ignore: IgnoreMatcher::new(ignore, warnings),
        }
    }

    pub fn from_config(config: &CompareConfig, warnings: &mut Vec<String>) -> Self {
        Self::with_ignore(
            config.compare_method,
            config.mtime_tolerance_secs,
            &config.ignore,
            warnings,
        )
    }

    pub fn method(&self) -> CompareMethod {
        self.method
    }

    /// Compares one directory level of `left` against `right` without
    /// descending into subdirectories.
    pub fn compare(&self, left: &Path, right: &Path) -> Result<LevelComparison, CompareError> {
        let left_entries = self.list(left)?;
        let right_entries = self.list(right)?;
        let mut level = LevelComparison::new(left, right);

        let names = left_entries
            .keys()
            .chain(right_entries.keys())
            .collect::<BTreeSet<_>>();

        for name in names {
            match (left_entries.get(name), right_entries.get(name)) {
                (Some(Listed::Unreadable(reason)), _) | (_, Some(Listed::Unreadable(reason))) => {
                    level.errors.push(LevelError {
                        name: name.clone(),
                        in_left: left_entries.contains_key(name),
                        in_right: right_entries.contains_key(name),
                        reason: reason.clone(),
                    });
                }
                (Some(Listed::Node(NodeType::Dir, _)), Some(Listed::Node(NodeType::Dir, _))) => {
                    level.subdirs.push(SubdirPair {
                        name: name.clone(),
                        in_left: true,
                        in_right: true,
                    });
                }
                (Some(Listed::Node(NodeType::Dir, _)), None) => level.subdirs.push(SubdirPair {
                    name: name.clone(),
                    in_left: true,
                    in_right: false,
                }),
                (None, Some(Listed::Node(NodeType::Dir, _))) => level.subdirs.push(SubdirPair {
                    name: name.clone(),
                    in_left: false,
                    in_right: true,
                }),
                (
                    Some(Listed::Node(NodeType::File, left_meta)),
                    Some(Listed::Node(NodeType::File, right_meta)),
                ) => {
                    let verdict = self.files_equal_with(
                        &left.join(name),
                        left_meta,
                        &right.join(name),
                        right_meta,
                    );
                    match verdict {
                        Ok(equal) => {
                            level.push_file(name, classify(true, true, Some(equal)), true, true)
                        }
                        Err(err) => level.errors.push(LevelError {
                            name: name.clone(),
                            in_left: true,
                            in_right: true,
                            reason: format!("content comparison failed: {err}"),
                        }),
                    }
                }
                (Some(Listed::Node(NodeType::File, _)), None) => {
                    level.push_file(name, classify(true, false, None), true, false)
                }
                (None, Some(Listed::Node(NodeType::File, _))) => {
                    level.push_file(name, classify(false, true, None), false, true)
                }
                (Some(Listed::Node(_, _)), Some(Listed::Node(_, _))) => {
                    level.errors.push(LevelError {
                        name: name.clone(),
                        in_left: true,
                        in_right: true,
                        reason: "file on one side, directory on the other".to_string(),
                    });
                }
                (None, None) => {}
            }
        }

        debug!(
            "compared {} <-> {}: {} same, {} changed, {} left-only, {} right-only, {} subdirs, {} errors",
            left.display(),
            right.display(),
            level.same_files.len(),
            level.diff_files.len(),
            level.left_only_files.len(),
            level.right_only_files.len(),
            level.subdirs.len(),
            level.errors.len()
        );
        Ok(level)
    }

    /// Enumerates a directory that exists only on `side`. `absent` is the
    /// location the directory would have on the other side.
    pub fn compare_one_side(
        &self,
        present: &Path,
        absent: &Path,
        side: Side,
    ) -> Result<LevelComparison, CompareError> {
        let entries = self.list(present)?;
        let in_left = side == Side::Left;
        let mut level = match side {
            Side::Left => LevelComparison::new(present, absent),
            Side::Right => LevelComparison::new(absent, present),
        };

        for (name, listed) in entries {
            match listed {
                Listed::Node(NodeType::Dir, _) => level.subdirs.push(SubdirPair {
                    name,
                    in_left,
                    in_right: !in_left,
                }),
                Listed::Node(NodeType::File, _) => {
                    level.push_file(&name, classify(in_left, !in_left, None), in_left, !in_left)
                }
                Listed::Unreadable(reason) => level.errors.push(LevelError {
                    name,
                    in_left,
                    in_right: !in_left,
                    reason,
                }),
            }
        }

        Ok(level)
    }

    pub fn files_equal(&self, left: &Path, right: &Path) -> io::Result<bool> {
        let left_meta = fs::metadata(left)?;
        let right_meta = fs::metadata(right)?;
        self.files_equal_with(left, &left_meta, right, &right_meta)
    }

    fn files_equal_with(
        &self,
        left: &Path,
        left_meta: &Metadata,
        right: &Path,
        right_meta: &Metadata,
    ) -> io::Result<bool> {
        if left_meta.len() != right_meta.len() {
            return Ok(false);
        }

        match self.method {
            CompareMethod::Metadata => {
                Ok(mtime_delta(left_meta, right_meta)? <= self.mtime_tolerance)
            }
            CompareMethod::Shallow => {
                if left_meta.modified()? == right_meta.modified()? {
                    return Ok(true);
                }
                Ok(hash_file(left)? == hash_file(right)?)
            }
            CompareMethod::Content => Ok(hash_file(left)? == hash_file(right)?),
        }
    }

    fn list(&self, dir: &Path) -> Result<BTreeMap<String, Listed>, CompareError> {
        let metadata = fs::metadata(dir).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => CompareError::NotFound(dir.to_path_buf()),
            _ => CompareError::Io {
                path: dir.to_path_buf(),
                source: err,
            },
        })?;
        if !metadata.is_dir() {
            return Err(CompareError::NotADirectory(dir.to_path_buf()));
        }

        let read_dir = fs::read_dir(dir).map_err(|err| CompareError::Io {
            path: dir.to_path_buf(),
            source: err,
        })?;

        let mut entries = BTreeMap::new();
        for item in read_dir {
            let item = item.map_err(|err| CompareError::Io {
                path: dir.to_path_buf(),
                source: err,
            })?;
            let name = item.file_name().to_string_lossy().to_string();
            if self.ignore.is_ignored(&name) {
                continue;
            }

            let listed = match fs::metadata(item.path()) {
                Ok(metadata) if metadata.is_dir() => Listed::Node(NodeType::Dir, metadata),
                Ok(metadata) if metadata.is_file() => Listed::Node(NodeType::File, metadata),
                Ok(_) => Listed::Unreadable("not a regular file or directory".to_string()),
                Err(err) => Listed::Unreadable(format!("metadata read failed: {err}")),
            };
            entries.insert(name, listed);
        }

        Ok(entries)
    }
}

fn mtime_delta(left: &Metadata, right: &Metadata) -> io::Result<Duration> {
    let left = left.modified()?;
    let right = right.modified()?;
    Ok(left
        .duration_since(right)
        .unwrap_or_else(|err| err.duration()))
}

fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0_u8; 64 * 1024];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

#[derive(Debug)]
struct IgnoreMatcher {
    globset: Option<GlobSet>,
    names: Vec<String>,
}

impl IgnoreMatcher {
    fn new(patterns: &[String], warnings: &mut Vec<String>) -> Self {
        if patterns.is_empty() {
            return Self {
                globset: None,
                names: Vec::new(),
            };
        }

        let mut builder = GlobSetBuilder::new();
        let mut names = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }

            if is_plain_name_pattern(pattern) {
                names.push(pattern.to_string());
                continue;
            }

            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => {
                    warnings.push(format!(
                        "invalid ignore glob '{pattern}': {err}; matching it as a literal name."
                    ));
                    names.push(pattern.to_string());
                }
            }
        }

        let globset = match builder.build() {
            Ok(set) => Some(set),
            Err(err) => {
                warnings.push(format!(
                    "failed to compile ignore glob set: {err}; glob ignores disabled."
                ));
                None
            }
        };

        Self { globset, names }
    }

    fn is_ignored(&self, name: &str) -> bool {
        if self.names.iter().any(|candidate| candidate == name) {
            return true;
        }
        self.globset
            .as_ref()
            .is_some_and(|globset| globset.is_match(name))
    }
}

fn is_plain_name_pattern(pattern: &str) -> bool {
    !pattern
        .chars()
        .any(|ch| matches!(ch, '*' | '?' | '[' | ']' | '{' | '}'))
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    use super::{CompareMethod, PathComparator, SubdirPair};
    use crate::error::CompareError;
    use crate::model::Side;

    fn fixture() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp = TempDir::new().expect("tempdir");
        let left = temp.path().join("left");
        let right = temp.path().join("right");
        fs::create_dir_all(&left).expect("left root");
        fs::create_dir_all(&right).expect("right root");
        (temp, left, right)
    }

    #[test]
    fn buckets_files_and_subdirs_for_one_level() {
        let (_temp, left, right) = fixture();
        fs::write(left.join("a.txt"), "hi").expect("write");
        fs::write(right.join("a.txt"), "bye").expect("write");
        fs::write(left.join("b.txt"), "same").expect("write");
        fs::write(right.join("b.txt"), "same").expect("write");
        fs::write(right.join("c.txt"), "new").expect("write");
        fs::write(left.join("d.txt"), "old").expect("write");
        fs::create_dir(left.join("shared")).expect("dir");
        fs::create_dir(right.join("shared")).expect("dir");
        fs::create_dir(right.join("extra")).expect("dir");

        let level = PathComparator::new(CompareMethod::Shallow)
            .compare(&left, &right)
            .expect("compare");

        assert_eq!(level.diff_files, vec!["a.txt".to_string()]);
        assert_eq!(level.same_files, vec!["b.txt".to_string()]);
        assert_eq!(level.right_only_files, vec!["c.txt".to_string()]);
        assert_eq!(level.left_only_files, vec!["d.txt".to_string()]);
        assert!(level.subdirs.contains(&SubdirPair {
            name: "shared".to_string(),
            in_left: true,
            in_right: true,
        }));
        assert!(level.subdirs.contains(&SubdirPair {
            name: "extra".to_string(),
            in_left: false,
            in_right: true,
        }));
        assert!(level.errors.is_empty());
    }

    #[test]
    fn missing_root_is_not_found() {
        let (temp, left, _right) = fixture();
        let missing = temp.path().join("nope");
        let err = PathComparator::new(CompareMethod::Shallow)
            .compare(&left, &missing)
            .expect_err("missing right root");
        assert!(matches!(err, CompareError::NotFound(path) if path == missing));
    }

    #[test]
    fn default_ignores_and_globs_skip_names() {
        let (_temp, left, right) = fixture();
        fs::create_dir(left.join(".git")).expect("dir");
        fs::write(left.join("scratch.tmp"), "x").expect("write");
        fs::write(left.join("keep.txt"), "x").expect("write");

        let level = PathComparator::new(CompareMethod::Shallow)
            .compare(&left, &right)
            .expect("compare");
        assert!(level.subdirs.is_empty());
        assert_eq!(level.left_only_files.len(), 2);

        let mut warnings = Vec::new();
        let comparator = PathComparator::with_ignore(
            CompareMethod::Shallow,
            0,
            &["*.tmp".to_string(), ".git".to_string()],
            &mut warnings,
        );
        let level = comparator.compare(&left, &right).expect("compare");
        assert_eq!(level.left_only_files, vec!["keep.txt".to_string()]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn metadata_method_trusts_size_and_mtime() {
        let (_temp, left, right) = fixture();
        let a = left.join("f.bin");
        let b = right.join("f.bin");
        fs::write(&a, "abcd").expect("write");
        fs::write(&b, "wxyz").expect("write");
        let stamp = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&a)
            .and_then(|file| file.set_modified(stamp))
            .expect("set mtime a");
        File::options()
            .write(true)
            .open(&b)
            .and_then(|file| file.set_modified(stamp))
            .expect("set mtime b");

        let metadata = PathComparator::new(CompareMethod::Metadata);
        assert!(metadata.files_equal(&a, &b).expect("compare"));

        let shallow = PathComparator::new(CompareMethod::Shallow);
        assert!(shallow.files_equal(&a, &b).expect("compare"));

        let content = PathComparator::new(CompareMethod::Content);
        assert!(!content.files_equal(&a, &b).expect("compare"));
    }

    #[test]
    fn one_sided_directory_lists_everything_on_that_side() {
        let (_temp, left, right) = fixture();
        let only = right.join("photos");
        fs::create_dir_all(only.join("2024")).expect("dir");
        fs::write(only.join("cover.jpg"), "img").expect("write");

        let level = PathComparator::new(CompareMethod::Shallow)
            .compare_one_side(&only, &left.join("photos"), Side::Right)
            .expect("one side");

        assert_eq!(level.right, only);
        assert_eq!(level.left, left.join("photos"));
        assert_eq!(level.right_only_files, vec!["cover.jpg".to_string()]);
        assert_eq!(
            level.subdirs,
            vec![SubdirPair {
                name: "2024".to_string(),
                in_left: false,
                in_right: true,
            }]
        );
    }

    #[test]
    fn file_versus_directory_is_reported_as_error() {
        let (_temp, left, right) = fixture();
        fs::write(left.join("thing"), "file").expect("write");
        fs::create_dir(right.join("thing")).expect("dir");

        let level = PathComparator::new(CompareMethod::Shallow)
            .compare(&left, &right)
            .expect("compare");
        assert_eq!(level.errors.len(), 1);
        assert_eq!(level.errors[0].name, "thing");
        assert!(level.subdirs.is_empty());
    }
}
