use std::fs::File;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::cancel::CancellationToken;
use crate::config::{ParamValue, ValidationResult};
use crate::error::StepError;
use crate::result::StepResult;
use crate::step::{Step, StepOptions, StepProgress, ANY_EXTENSION};

use super::{into_step_result, pump, to_extensions};

pub const PARAM_ZIP_LEVEL: &str = "zip_level";

/// Packs each file alone into `<file name>.zip` with deflate.
pub struct ZipStep {
    extensions: Vec<String>,
}

impl ZipStep {
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
}

impl Default for ZipStep {
    fn default() -> Self {
        Self::new()
    }
}

impl Step for ZipStep {
    fn id(&self) -> &str {
        "zip"
    }

    fn supported_extensions(&self) -> &[String] {
        &self.extensions
    }

    fn validate(&self, options: &StepOptions) -> ValidationResult {
        match options.parameters.get(PARAM_ZIP_LEVEL) {
            None => ValidationResult::valid(),
            Some(ParamValue::Int(level)) if (0..=9).contains(level) => ValidationResult::valid(),
            Some(_) => ValidationResult::invalid([format!(
                "{} must be an integer between 0 and 9",
                PARAM_ZIP_LEVEL
            )]),
        }
    }

    fn derive_output_path(&self, input: &Path, options: &StepOptions) -> PathBuf {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        options.output_dir_for(input).join(format!("{}.zip", name))
    }

    fn execute(
        &self,
        input: &Path,
        output: &Path,
        options: &StepOptions,
        progress: Option<StepProgress<'_>>,
        cancel: &CancellationToken,
    ) -> StepResult {
        let level = options.parameters.get(PARAM_ZIP_LEVEL).and_then(|v| match v {
            ParamValue::Int(level) => Some(*level),
            _ => None,
        });
        into_step_result(input, output, zip_file(input, output, level, progress, cancel))
    }
}

fn zip_file(
    input: &Path,
    output: &Path,
    level: Option<i64>,
    progress: Option<StepProgress<'_>>,
    cancel: &CancellationToken,
) -> Result<u64, StepError> {
    let mut reader = File::open(input).map_err(|e| StepError::io(input, e))?;
    let total = reader.metadata().map(|m| m.len()).unwrap_or(0);

    let entry_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let file = File::create(output).map_err(|e| StepError::io(output, e))?;
    let mut writer = ZipWriter::new(file);
    let entry_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(level)
        .large_file(total >= u64::from(u32::MAX));

    writer.start_file(entry_name, entry_options)?;
    pump(&mut reader, &mut writer, (input, output), total, progress, cancel)?;
    writer.finish()?;

    std::fs::metadata(output)
        .map(|m| m.len())
        .map_err(|e| StepError::io(output, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::result::OutcomeKind;
    use std::io::Read;
    use tempfile::TempDir;

    fn options_with_level(level: impl Into<ParamValue>) -> StepOptions {
        StepOptions {
            parameters: Parameters::new().with(PARAM_ZIP_LEVEL, level),
            ..StepOptions::default()
        }
    }

    #[test]
    fn test_output_name_appends_zip() {
        assert_eq!(
            ZipStep::new().derive_output_path(Path::new("/in/a.txt"), &StepOptions::default()),
            PathBuf::from("/in/a.txt.zip")
        );
    }

    #[test]
    fn test_validate_level() {
        let step = ZipStep::new();
        assert!(step.validate(&StepOptions::default()).is_valid());
        assert!(step.validate(&options_with_level(6i64)).is_valid());
        assert!(!step.validate(&options_with_level(12i64)).is_valid());
        assert!(!step.validate(&options_with_level("fast")).is_valid());
    }

    #[test]
    fn test_execute_produces_readable_archive() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("notes.txt");
        let output = tmp.path().join("notes.txt.zip");
        let content = "line\n".repeat(1000);
        std::fs::write(&input, &content).unwrap();

        let result = ZipStep::new().execute(
            &input,
            &output,
            &options_with_level(9i64),
            None,
            &CancellationToken::new(),
        );

        assert!(result.is_success(), "{:?}", result);
        assert!(result.output_bytes() < content.len() as u64);

        let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "notes.txt");
        let mut unpacked = String::new();
        entry.read_to_string(&mut unpacked).unwrap();
        assert_eq!(unpacked, content);
    }

    #[test]
    fn test_execute_cancelled() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.txt");
        std::fs::write(&input, b"x").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ZipStep::new().execute(
            &input,
            &tmp.path().join("a.txt.zip"),
            &StepOptions::default(),
            None,
            &cancel,
        );
        assert_eq!(result.kind(), OutcomeKind::Cancelled);
    }
}
