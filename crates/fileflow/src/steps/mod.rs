//! Steps shipped with the engine.

pub mod archive;
pub mod copy;
pub mod extract;

use std::io::{Read, Write};
use std::path::Path;

use crate::cancel::CancellationToken;
use crate::error::{error_chain, StepError};
use crate::result::StepResult;
use crate::step::StepProgress;

pub use archive::ZipStep;
pub use copy::CopyStep;
pub use extract::UnzipStep;

const CHUNK_SIZE: usize = 64 * 1024;

fn to_extensions<I, S>(extensions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    extensions.into_iter().map(Into::into).collect()
}

fn into_step_result(input: &Path, output: &Path, outcome: Result<u64, StepError>) -> StepResult {
    match outcome {
        Ok(bytes) => StepResult::succeeded(input, output, 0, bytes),
        Err(StepError::Cancelled) => StepResult::cancelled(input),
        Err(e) => StepResult::failed(input, e.to_string()).with_detail(error_chain(&e)),
    }
}

/// Copies `reader` into `writer` chunk by chunk, checking `cancel` before
/// every chunk. `total` only scales progress reports.
fn pump<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    (from, to): (&Path, &Path),
    total: u64,
    progress: Option<StepProgress<'_>>,
    cancel: &CancellationToken,
) -> Result<u64, StepError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let n = reader.read(&mut buf).map_err(|e| StepError::io(from, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|e| StepError::io(to, e))?;
        copied += n as u64;

        if let Some(report) = progress {
            if total > 0 {
                report((copied as f64 / total as f64).min(1.0) as f32);
            }
        }
    }

    writer.flush().map_err(|e| StepError::io(to, e))?;
    Ok(copied)
}
