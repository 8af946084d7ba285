//! Test harness for isolated runs.
//!
//! Every harness owns a temp directory with `input/` and `output/`
//! subdirectories and can snapshot the whole tree, which is how tests check
//! that nothing changed or that no staging directory was left behind.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use fileflow::Options;

pub struct TestHarness {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TestHarness {
    /// Creates `input/`; `output/` is left for the run to create.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");

        Self {
            temp_dir,
            input_dir,
            output_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write_input(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.input_dir.join(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create input subdir");
        }
        std::fs::write(&path, content).expect("Failed to write input file");
        path
    }

    pub fn write_text_inputs(&self, count: usize, ext: &str) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let name = format!("file{:02}.{}", i, ext);
                self.write_input(&name, format!("content {}", i).as_bytes())
            })
            .collect()
    }

    /// Options reading `input/` and writing to `output/`.
    pub fn options(&self) -> Options {
        Options::new(self.input_dir.to_string_lossy()).with_output_directory(&self.output_dir)
    }

    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(filename)
    }

    /// Sorted names of the regular files directly in `output/`.
    pub fn output_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.output_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Every staging leftover anywhere under the temp directory.
    pub fn leftover_temps(&self) -> Vec<PathBuf> {
        WalkDir::new(self.temp_path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                name.starts_with('.') && name.ends_with(".tmp")
            })
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    /// Relative path and content of every file and directory under the
    /// temp directory.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        WalkDir::new(self.temp_path())
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| {
                let relative = e
                    .path()
                    .strip_prefix(self.temp_path())
                    .expect("entry below temp dir")
                    .to_path_buf();
                let content = if e.file_type().is_file() {
                    Some(std::fs::read(e.path()).expect("Failed to read file"))
                } else {
                    None
                };
                (relative, content)
            })
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
