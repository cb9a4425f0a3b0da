//! Directory enumeration in filesystem order.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn entries(root: &Path, recursive: bool) -> impl Iterator<Item = Result<DirEntry>> {
    let walker = WalkDir::new(root).min_depth(1);
    let walker = if recursive { walker } else { walker.max_depth(1) };
    let root = root.to_path_buf();
    walker
        .into_iter()
        .map(move |e| e.with_context(|| format!("walking {}", root.display())))
}

/// Immediate sub-directories of `root` whose name starts with `prefix`.
pub fn prefixed_dirs<'a>(
    root: &Path,
    prefix: &'a str,
) -> impl Iterator<Item = Result<PathBuf>> + 'a {
    entries(root, false).filter_map(move |e| match e {
        Ok(e) if e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with(prefix) => {
            Some(Ok(e.into_path()))
        }
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    })
}

/// Non-hidden regular files of `root`, descending into sub-directories when
/// `recursive` is set. Errors are yielded in place so callers decide whether
/// they are fatal.
pub fn files(root: &Path, recursive: bool) -> impl Iterator<Item = Result<PathBuf>> {
    entries(root, recursive).filter_map(|e| match e {
        Ok(e) if e.file_type().is_file() && !is_hidden(e.path()) => Some(Ok(e.into_path())),
        Ok(_) => None,
        Err(err) => Some(Err(err)),
    })
}
