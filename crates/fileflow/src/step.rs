use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::config::{Parameters, ValidationResult};
use crate::result::StepResult;

/// Extension entry matching every file.
pub const ANY_EXTENSION: &str = "*";

/// Shape of what a step writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// A single file. The executor hands the step a temporary path and only
    /// renames it to the final location once the step succeeded, so the final
    /// path never holds a partial file.
    #[default]
    File,
    /// A directory of files. The step writes straight into the final
    /// directory; a failure part-way can leave some of its files behind.
    /// Such a step must be the last one applied to a file.
    Directory,
}

/// The options a step sees: where outputs go, whether replacing is allowed,
/// and the free-form parameter bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOptions {
    pub output_directory: Option<PathBuf>,
    pub overwrite: bool,
    pub parameters: Parameters,
}

impl StepOptions {
    /// Directory an output derived from `input` should land in.
    pub fn output_dir_for(&self, input: &Path) -> PathBuf {
        match &self.output_directory {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}

/// Optional per-step progress callback, fraction in `0.0..=1.0`.
pub type StepProgress<'a> = &'a (dyn Fn(f32) + Sync);

/// One transformation in a chain.
///
/// Implementations hold no per-run state and are invoked concurrently from
/// several workers. Failures are returned as [`StepResult::failed`], never
/// by panicking; cancellation observed inside the step is returned as
/// [`StepResult::cancelled`].
pub trait Step: Send + Sync {
    fn id(&self) -> &str;

    /// Extensions this step accepts, case-insensitive, with or without a
    /// leading dot. [`ANY_EXTENSION`] accepts everything.
    fn supported_extensions(&self) -> &[String];

    fn output_kind(&self) -> OutputKind {
        OutputKind::File
    }

    fn validate(&self, options: &StepOptions) -> ValidationResult;

    fn derive_output_path(&self, input: &Path, options: &StepOptions) -> PathBuf;

    fn execute(
        &self,
        input: &Path,
        output: &Path,
        options: &StepOptions,
        progress: Option<StepProgress<'_>>,
        cancel: &CancellationToken,
    ) -> StepResult;

    fn supports(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        self.supported_extensions()
            .iter()
            .any(|supported| extension_matches(supported, ext))
    }
}

fn extension_matches(supported: &str, ext: &str) -> bool {
    let supported = supported.trim_start_matches('.');
    supported == ANY_EXTENSION || (!ext.is_empty() && supported.eq_ignore_ascii_case(ext))
}
