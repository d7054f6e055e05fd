use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{InvalidResolution, ResolveError, ResolveErrorKind, SessionError};
use crate::model::{ChangeKind, Entry};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    KeepLeft,
    KeepRight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Works out which side overwrites which. One-sided entries can only be
/// copied from the side they exist on.
pub fn plan(entry: &Entry, direction: Direction) -> Result<CopyPlan, InvalidResolution> {
    match (entry.change, direction) {
        (ChangeKind::Unchanged | ChangeKind::Unknown, _) => {
            return Err(InvalidResolution::Unresolvable(entry.change))
        }
        (ChangeKind::LeftOnly, Direction::KeepRight)
        | (ChangeKind::RightOnly, Direction::KeepLeft) => {
            return Err(InvalidResolution::WrongSide(entry.change))
        }
        _ => {}
    }

    let (left, right) = entry
        .side_paths()
        .ok_or(InvalidResolution::Unresolvable(entry.change))?;
    let (source, destination) = match direction {
        Direction::KeepLeft => (left, right),
        Direction::KeepRight => (right, left),
    };
    Ok(CopyPlan {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
    })
}

pub fn execute(plan: &CopyPlan) -> Result<(), ResolveError> {
    let metadata = match fs::metadata(&plan.source) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ResolveError::new(
                ResolveErrorKind::SourceVanished,
                &plan.source,
                "source no longer exists",
            ))
        }
        Err(err) => return Err(ResolveError::from_io(&err, &plan.source)),
    };

    let created = match plan
        .destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        Some(parent) => {
            let created = first_missing_ancestor(parent);
            fs::create_dir_all(parent).map_err(|err| ResolveError::from_io(&err, parent))?;
            created
        }
        None => None,
    };

    info!(
        "copying {} -> {}",
        plan.source.display(),
        plan.destination.display()
    );
    let result = if metadata.is_dir() {
        copy_tree(&plan.source, &plan.destination)
    } else {
        copy_file_preserving(&plan.source, &plan.destination)
    };

    // Parent folders made for this copy go away with it.
    if let (Err(_), Some(created)) = (&result, &created) {
        if let Err(err) = fs::remove_dir_all(created) {
            warn!(
                "failed to remove folder {} created for a failed copy: {}",
                created.display(),
                err
            );
        }
    }
    result
}

/// Outermost ancestor of `dir`, `dir` included, that does not exist yet.
fn first_missing_ancestor(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .take_while(|ancestor| {
            !ancestor.as_os_str().is_empty() && fs::symlink_metadata(ancestor).is_err()
        })
        .last()
        .map(Path::to_path_buf)
}

/// Plans and performs the copy for one entry.
pub fn resolve(entry: &Entry, direction: Direction) -> Result<(), SessionError> {
    let plan = plan(entry, direction)?;
    execute(&plan)?;
    Ok(())
}

/// Overwrites `destination` with `source`, keeping permissions and the
/// modification time.
pub fn copy_file_preserving(source: &Path, destination: &Path) -> Result<(), ResolveError> {
    fs::copy(source, destination).map_err(|err| ResolveError::from_io(&err, destination))?;

    let modified = fs::metadata(source)
        .and_then(|metadata| metadata.modified())
        .map_err(|err| ResolveError::from_io(&err, source))?;
    let file = OpenOptions::new()
        .write(true)
        .open(destination)
        .or_else(|_| File::open(destination))
        .map_err(|err| ResolveError::from_io(&err, destination))?;
    file.set_modified(modified)
        .map_err(|err| ResolveError::from_io(&err, destination))?;
    Ok(())
}

/// Recreates `source` at `destination`. Refuses to merge into an existing
/// directory and removes whatever it created when a copy fails midway.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<(), ResolveError> {
    if fs::symlink_metadata(destination).is_ok() {
        return Err(ResolveError::new(
            ResolveErrorKind::AlreadyExists,
            destination,
            "destination directory already exists",
        ));
    }

    let result = copy_tree_inner(source, destination);
    if result.is_err() && destination.exists() {
        if let Err(err) = fs::remove_dir_all(destination) {
            warn!(
                "failed to clean up partial copy {}: {}",
                destination.display(),
                err
            );
        }
    }
    result
}

fn copy_tree_inner(source: &Path, destination: &Path) -> Result<(), ResolveError> {
    for item in WalkDir::new(source).follow_links(true) {
        let item = item.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source.to_path_buf());
            let err: io::Error = err.into();
            ResolveError::from_io(&err, &path)
        })?;
        let relative = item.path().strip_prefix(source).map_err(|err| {
            ResolveError::new(ResolveErrorKind::Io, item.path(), err.to_string())
        })?;
        let target = destination.join(relative);

        if item.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| ResolveError::from_io(&err, &target))?;
        } else {
            debug!("copying {}", item.path().display());
            copy_file_preserving(item.path(), &target)?;
        }
    }
    Ok(())
}

/// Short labels for the parent folders of two same-named files. When both
/// parents end in the same folder name, each label starts at the first
/// ancestor where the two paths diverge, e.g. `left/docs` or
/// `left/.../docs`.
pub fn disambiguate(left: &Path, right: &Path) -> (String, String) {
    let left_parts = parent_parts(left);
    let right_parts = parent_parts(right);
    let left_folder = left_parts.last().cloned().unwrap_or_default();
    let right_folder = right_parts.last().cloned().unwrap_or_default();
    if left_folder != right_folder || left_parts.is_empty() {
        return (left_folder, right_folder);
    }

    let divergent = (0..left_parts.len())
        .find(|&index| right_parts.get(index) != Some(&left_parts[index]))
        .unwrap_or(left_parts.len() - 1);
    let right_anchor = right_parts
        .get(divergent)
        .or(right_parts.last())
        .cloned()
        .unwrap_or_default();

    (
        shorten(&left_parts[divergent], &left_parts),
        shorten(&right_anchor, &right_parts),
    )
}

fn parent_parts(path: &Path) -> Vec<String> {
    path.parent()
        .map(|parent| {
            parent
                .components()
                .map(|component| match component {
                    Component::RootDir => MAIN_SEPARATOR.to_string(),
                    other => other.as_os_str().to_string_lossy().into_owned(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn shorten(anchor: &str, parts: &[String]) -> String {
    let [.., before_last, last] = parts else {
        return anchor.to_string();
    };
    if anchor == before_last {
        format!("{anchor}{MAIN_SEPARATOR}{last}")
    } else if anchor != last {
        format!("{anchor}{MAIN_SEPARATOR}...{MAIN_SEPARATOR}{last}")
    } else {
        anchor.to_string()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PromptChoice {
    pub label: String,
    pub direction: Option<Direction>,
}

impl PromptChoice {
    fn dismiss(label: &str) -> Self {
        Self {
            label: label.to_string(),
            direction: None,
        }
    }

    fn copy(label: String, direction: Direction) -> Self {
        Self {
            label,
            direction: Some(direction),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolutionPrompt {
    pub title: String,
    pub message: String,
    pub choices: Vec<PromptChoice>,
}

/// Texts a frontend shows when asking which way to resolve an entry.
pub fn prompt(entry: &Entry) -> ResolutionPrompt {
    let title = "Resolve changes".to_string();
    let folder_of = |path: Option<&Path>| {
        path.and_then(Path::parent)
            .map(|parent| parent.display().to_string())
            .unwrap_or_default()
    };

    match (entry.change, entry.side_paths()) {
        (ChangeKind::Changed, Some((left, right))) => {
            let (left_label, right_label) = disambiguate(left, right);
            ResolutionPrompt {
                title,
                message: format!("The file {} has changed.", entry.name),
                choices: vec![
                    PromptChoice::dismiss("Cancel"),
                    PromptChoice::copy(format!("Copy to {left_label}"), Direction::KeepRight),
                    PromptChoice::copy(format!("Copy to {right_label}"), Direction::KeepLeft),
                ],
            }
        }
        (ChangeKind::LeftOnly | ChangeKind::RightOnly, Some(_)) => {
            let direction = if entry.change == ChangeKind::LeftOnly {
                Direction::KeepLeft
            } else {
                Direction::KeepRight
            };
            ResolutionPrompt {
                title,
                message: format!(
                    "The file {} is not in the folder {}. Copy over?",
                    entry.path.display(),
                    folder_of(entry.alternate_path.as_deref())
                ),
                choices: vec![
                    PromptChoice::dismiss("No"),
                    PromptChoice::copy("Yes".to_string(), direction),
                ],
            }
        }
        _ => ResolutionPrompt {
            title,
            message: "Hooray! No changes to show.".to_string(),
            choices: vec![PromptChoice::dismiss("Ok")],
        },
    }
}
