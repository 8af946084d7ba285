pub mod filesystem;

pub use filesystem::{ensure_directory, is_staging_name, output_size, StagingArea};
