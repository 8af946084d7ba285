use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first (fast, atomic on same
/// filesystem). Falls back to copy + delete when rename fails, which handles
/// cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::RemoveFile {
        path: src.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Places `src` at `dst` only if nothing exists at `dst` yet. The existence
/// check and the placement are a single filesystem call, so two writers
/// racing for the same `dst` cannot both win. `src` is left in place.
fn claim_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    match std::fs::hard_link(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(StorageError::OutputExists(dst.to_path_buf()))
        }
        // No hard links on this filesystem: exclusive create, then copy.
        Err(_) => {}
    }

    let move_error = |e: std::io::Error| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    };
    let mut target = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dst)
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                StorageError::OutputExists(dst.to_path_buf())
            } else {
                move_error(e)
            }
        })?;

    let copied = File::open(src).and_then(|mut source| std::io::copy(&mut source, &mut target));
    if let Err(e) = copied {
        drop(target);
        let _ = std::fs::remove_file(dst);
        return Err(move_error(e));
    }
    Ok(())
}

/// Creates `path` and its ancestors. Safe when several workers race on the
/// same directory.
pub fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

const STAGING_SUFFIX: &str = ".tmp";

/// Whether `name` has the shape of a [`StagingArea`] directory name.
pub fn is_staging_name(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    name.len() > 1 + STAGING_SUFFIX.len() && name.starts_with('.') && name.ends_with(STAGING_SUFFIX)
}

/// Hidden, uniquely named scratch directory created next to a final output.
///
/// A step writes its output inside it under the real file name, so the
/// extension a step may rely on is preserved. Only [`StagingArea::publish`]
/// moves anything out; the directory and whatever is left in it are removed
/// on drop, including when a step fails or panics.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
}

impl StagingArea {
    /// Creates `.<file name>.<uuid>.tmp/` in the directory of `final_path`,
    /// creating that directory first if needed.
    pub fn beside(final_path: &Path) -> Result<Self, StorageError> {
        let dir = final_path.parent().unwrap_or_else(|| Path::new(""));
        ensure_directory(dir)?;

        let mut name = OsString::from(".");
        name.push(final_path.file_name().unwrap_or(OsStr::new("output")));
        name.push(format!(".{}{}", uuid::Uuid::new_v4().simple(), STAGING_SUFFIX));
        let path = dir.join(name);

        std::fs::create_dir(&path).map_err(|e| StorageError::CreateDirectory {
            path: path.clone(),
            source: e,
        })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a step should write the output it would have written to
    /// `destination`.
    pub fn file_for(&self, destination: &Path) -> PathBuf {
        self.path
            .join(destination.file_name().unwrap_or(OsStr::new("output")))
    }

    /// Moves `staged` (a path inside this area) to `final_path` and returns
    /// the published size.
    ///
    /// An existing file at `final_path` is replaced only when `replace` is
    /// set; otherwise the call fails with [`StorageError::OutputExists`] and
    /// the staged file is discarded. This holds even when another writer
    /// creates `final_path` concurrently.
    pub fn publish(
        self,
        staged: &Path,
        final_path: &Path,
        replace: bool,
    ) -> Result<u64, StorageError> {
        if replace {
            move_file(staged, final_path)?;
        } else {
            claim_file(staged, final_path)?;
        }
        file_size(final_path)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if std::fs::symlink_metadata(&self.path).is_err() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(
                "Failed to remove staging directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

fn file_size(path: &Path) -> Result<u64, StorageError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| StorageError::Metadata {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Size of a file, or the summed size of every file below a directory.
/// `None` when nothing exists at `path`.
pub fn output_size(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_dir() {
        return Some(meta.len());
    }

    let total = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    Some(total)
}
