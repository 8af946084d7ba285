use std::fs::File;
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::config::{ParamValue, ValidationResult};
use crate::error::StepError;
use crate::result::StepResult;
use crate::step::{Step, StepOptions, StepProgress, ANY_EXTENSION};

use super::{into_step_result, pump, to_extensions};

pub const PARAM_COPY_SUFFIX: &str = "copy_suffix";
pub const DEFAULT_COPY_SUFFIX: &str = "_copy";

/// Copies each file to `<stem><suffix>.<ext>`.
pub struct CopyStep {
    extensions: Vec<String>,
}

impl CopyStep {
    pub fn new() -> Self {
        Self::for_extensions([ANY_EXTENSION])
    }

    pub fn for_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: to_extensions(extensions),
        }
    }

    fn suffix(options: &StepOptions) -> String {
        options
            .parameters
            .get_or(PARAM_COPY_SUFFIX, DEFAULT_COPY_SUFFIX.to_string())
    }
}

impl Default for CopyStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for CopyStep {
    fn id(&self) -> &str {
        "copy"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }

    fn validate(&self, options: &StepOptions) -> ValidationResult {
        match options.parameters.get(PARAM_COPY_SUFFIX) {
            Some(ParamValue::Str(suffix)) if suffix.contains(['/', '\\']) => {
                ValidationResult::invalid([format!(
                    "{} must not contain path separators",
                    PARAM_COPY_SUFFIX
                )])
            }
            Some(ParamValue::Str(suffix))
                if suffix.is_empty() && options.output_directory.is_none() =>
            {
                ValidationResult::valid().with_warning(format!(
                    "empty {} without an output directory copies files onto themselves",
                    PARAM_COPY_SUFFIX
                ))
            }
            Some(ParamValue::Str(_)) | None => ValidationResult::valid(),
            Some(_) => {
                ValidationResult::invalid([format!("{} must be a string", PARAM_COPY_SUFFIX)])
            }
        }
    }

    fn derive_output_path(&self, input: &Path, options: &StepOptions) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        options
            .output_dir_for(input)
            .join(format!("{}{}{}", stem, Self::suffix(options), ext))
    }

    fn execute(
        &self,
        input: &Path,
        output: &Path,
        _options: &StepOptions,
        progress: Option<StepProgress<'_>>,
        cancel: &CancellationToken,
    ) -> StepResult {
        into_step_result(input, output, copy_file(input, output, progress, cancel))
    }
}

fn copy_file(
    input: &Path,
    output: &Path,
    progress: Option<StepProgress<'_>>,
    cancel: &CancellationToken,
) -> Result<u64, StepError> {
    let mut reader = File::open(input).map_err(|e| StepError::io(input, e))?;
    let total = reader.metadata().map(|m| m.len()).unwrap_or(0);
    let mut writer = File::create(output).map_err(|e| StepError::io(output, e))?;

    pump(&mut reader, &mut writer, (input, output), total, progress, cancel)
}
