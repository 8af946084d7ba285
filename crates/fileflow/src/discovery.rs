//! Turns an input location into an ordered list of candidate files.

use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Options;
use crate::storage::is_staging_name;

/// Resolves `options.input` to concrete files, sorted by full path.
///
/// A missing or unmatched input yields an empty list; the planner reports
/// that as a warning.
pub fn discover(options: &Options) -> Vec<PathBuf> {
    let filter = match Pattern::new(&options.filter) {
        Ok(p) => p,
        Err(e) => {
            warn!("Invalid file filter '{}': {}", options.filter, e);
            return Vec::new();
        }
    };

    let input = Path::new(options.input.trim());

    let mut files = if input.is_file() {
        vec![input.to_path_buf()]
    } else if input.is_dir() {
        scan_directory(input, &filter, None, options)
    } else {
        match split_glob(input) {
            Some((dir, name_pattern)) => {
                scan_directory(&dir, &filter, Some(&name_pattern), options)
            }
            None => {
                debug!("Input '{}' is neither a file nor a directory", input.display());
                Vec::new()
            }
        }
    };

    files.sort();

    info!("Discovered {} files from '{}'", files.len(), input.display());
    files
}

/// Splits `dir/pattern` when `dir` exists and `pattern` is a valid glob.
fn split_glob(input: &Path) -> Option<(PathBuf, Pattern)> {
    let name = input.file_name()?.to_str()?;
    let parent = match input.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if !parent.is_dir() {
        return None;
    }

    match Pattern::new(name) {
        Ok(pattern) => Some((parent, pattern)),
        Err(e) => {
            debug!("'{}' is not a usable file pattern: {}", name, e);
            None
        }
    }
}

fn scan_directory(
    dir: &Path,
    filter: &Pattern,
    name_pattern: Option<&Pattern>,
    options: &Options,
) -> Vec<PathBuf> {
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    // Only a recursive walk can descend into the output directory.
    let excluded = match (&options.output_directory, options.recursive) {
        (Some(out), true) => Some(normalize_path(out)),
        _ => None,
    };

    let mut files = Vec::new();
    let mut excluded_count = 0;

    // Staging directories of a concurrent run hold half-written outputs.
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && is_staging_name(e.file_name()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under '{}': {}", dir.display(), e);
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().is_dir() || !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            debug!("Skipping non UTF-8 file name: {}", path.display());
            continue;
        };

        if !filter.matches(file_name) {
            continue;
        }
        if let Some(pattern) = name_pattern {
            if !pattern.matches(file_name) {
                continue;
            }
        }

        if let Some(out) = &excluded {
            if normalize_path(path).starts_with(out) {
                excluded_count += 1;
                continue;
            }
        }

        files.push(path.to_path_buf());
    }

    if excluded_count > 0 {
        debug!(
            "Excluded {} files already inside the output directory",
            excluded_count
        );
    }

    files
}

/// Absolute form of `path` for containment checks. The longest existing
/// ancestor is canonicalized (resolving symlinks) and the rest is appended
/// with `.` and `..` removed lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let absolute = lexical_clean(&absolute);

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut result = canonical;
            for part in tail.iter().rev() {
                result.push(part);
            }
            return result;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
