pub mod loader;
pub mod parameters;
pub mod schema;
pub mod validation;

pub use loader::{load_options, load_options_from_str, ConfigFormat};
pub use parameters::{FromParam, ParamValue, Parameters};
pub use schema::{Options, MAX_PARALLELISM};
pub use validation::{validate, ValidationResult};
