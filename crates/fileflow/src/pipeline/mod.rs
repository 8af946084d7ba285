pub mod runner;

pub use runner::{ChainRunner, MESSAGE_NO_OUTPUT};
