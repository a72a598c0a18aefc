pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod rag;

pub use error::{RagError, RagResult};
