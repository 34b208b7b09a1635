//! Resolution of wikilink targets to files inside the vault.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("Content root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to resolve content root {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Finds files by name, starting near the note being compiled
///
/// Targets containing a path separator are treated as paths relative to the
/// content root and are never searched for. Bare names are searched
/// breadth-first from the current note's directory, then from the root.
#[derive(Debug, Clone)]
pub struct Locator {
    root: PathBuf,
    current_dir: PathBuf,
}

impl Locator {
    pub fn new(root: &Path, current_file: &Path) -> Result<Self, LocatorError> {
        if !root.is_dir() {
            return Err(LocatorError::NotADirectory(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|source| LocatorError::Canonicalize {
                path: root.to_path_buf(),
                source,
            })?;

        let current_file = absolutize(current_file);
        let current_dir = current_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());

        Ok(Self { root, current_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// A locator for the same vault anchored at another file
    pub fn for_file(&self, file: &Path) -> Self {
        let file = absolutize(file);
        Self {
            root: self.root.clone(),
            current_dir: file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone()),
        }
    }

    /// Resolve a link target to an absolute path, or `None` if nothing matches
    pub fn resolve(&self, target: &str) -> Option<PathBuf> {
        let target = target.trim();
        if target.is_empty() {
            return None;
        }

        if target.contains('/') || target.contains('\\') {
            let candidate = self.root.join(target.replace('\\', "/"));
            let resolved = candidate.canonicalize().ok()?;
            return (resolved.is_file() && resolved.starts_with(&self.root)).then_some(resolved);
        }

        if let Some(found) = search_breadth_first(&self.current_dir, target) {
            return Some(found);
        }

        if self.current_dir != self.root {
            return search_breadth_first(&self.root, target);
        }

        None
    }
}

fn search_breadth_first(start: &Path, name: &str) -> Option<PathBuf> {
    let mut queue = VecDeque::from([start.to_path_buf()]);
    let mut visited = HashSet::new();

    while let Some(dir) = queue.pop_front() {
        if !visited.insert(dir.clone()) {
            continue;
        }

        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(absolutize(&candidate));
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Skipping unreadable directory {:?}: {}", dir, e);
                continue;
            }
        };

        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        subdirs.sort();
        queue.extend(subdirs);
    }

    None
}

fn absolutize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}
