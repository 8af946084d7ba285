//! Keeps directory structure out of span fields so traces can be shared.

use std::path::Path;

/// File name only, `<unknown>` when there is none.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}
