use std::fs::File;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::cancel::CancellationToken;
use crate::config::ValidationResult;
use crate::error::StepError;
use crate::result::StepResult;
use crate::step::{OutputKind, Step, StepOptions, StepProgress};

use super::{into_step_result, pump, to_extensions};

/// Extracts a zip archive into a directory named after its stem.
pub struct UnzipStep {
    extensions: Vec<String>,
}

impl UnzipStep {
    pub fn new() -> Self {
        Self {
            extensions: to_extensions(["zip"]),
        }
    }
}

impl Default for UnzipStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for UnzipStep {
    fn id(&self) -> &str {
        "unzip"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }

    fn output_kind(&self) -> OutputKind {
        OutputKind::Directory
    }

    fn validate(&self, _options: &StepOptions) -> ValidationResult {
        ValidationResult::valid()
    }

    fn derive_output_path(&self, input: &Path, options: &StepOptions) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        options.output_dir_for(input).join(stem)
    }

    fn execute(
        &self,
        input: &Path,
        output: &Path,
        _options: &StepOptions,
        progress: Option<StepProgress<'_>>,
        cancel: &CancellationToken,
    ) -> StepResult {
        into_step_result(input, output, extract(input, output, progress, cancel))
    }
}

fn extract(
    input: &Path,
    output: &Path,
    progress: Option<StepProgress<'_>>,
    cancel: &CancellationToken,
) -> Result<u64, StepError> {
    let file = File::open(input).map_err(|e| StepError::io(input, e))?;
    let mut archive = ZipArchive::new(file)?;
    std::fs::create_dir_all(output).map_err(|e| StepError::io(output, e))?;

    let count = archive.len();
    let mut written: u64 = 0;

    for index in 0..count {
        if cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let mut entry = archive.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| StepError::UnsafeEntry(entry.name().to_string()))?;
        let target = output.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| StepError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StepError::io(parent, e))?;
            }
            let size = entry.size();
            let mut out = File::create(&target).map_err(|e| StepError::io(&target, e))?;
            written += pump(&mut entry, &mut out, (input, target.as_path()), size, None, cancel)?;
        }

        if let Some(report) = progress {
            report((index + 1) as f32 / count as f32);
        }
    }

    Ok(written)
}
