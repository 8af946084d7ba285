use serde::Serialize;

use super::schema::{Options, MAX_PARALLELISM};

/// Outcome of checking options (engine-level or step-level).
///
/// Only [`ValidationResult::valid`] and [`ValidationResult::invalid`] build
/// one; warnings can be attached to either.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn invalid<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            errors: errors.into_iter().map(Into::into).collect(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Appends the errors and warnings of `other` after our own.
    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.errors, self.warnings)
    }
}

/// Pre-flight check of run options. Pure: touches neither the filesystem nor
/// any step. Every violated rule is reported, in a fixed order.
pub fn validate(options: &Options) -> ValidationResult {
    let mut errors = Vec::new();

    if options.input.trim().is_empty() {
        errors.push("input location must not be empty".to_string());
    }

    if options.max_parallelism < 1 || options.max_parallelism > MAX_PARALLELISM {
        errors.push(format!(
            "max_parallelism must be between 1 and {} (got {})",
            MAX_PARALLELISM, options.max_parallelism
        ));
    }

    if let Err(e) = glob::Pattern::new(&options.filter) {
        errors.push(format!("filter '{}' is not a valid pattern: {}", options.filter, e));
    }

    if let Some(dir) = &options.output_directory {
        if dir.as_os_str().is_empty() {
            errors.push("output_directory must not be empty when set".to_string());
        }
    }

    let mut result = if errors.is_empty() {
        ValidationResult::valid()
    } else {
        ValidationResult::invalid(errors)
    };

    if !options.continue_on_error {
        result = result.with_warning(
            "continue_on_error=false is advisory: every queued file is still attempted",
        );
    }

    result
}
