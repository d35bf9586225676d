//! Error types shared across the workspace

pub mod context;
pub mod types;

pub use context::{ErrorContext, ErrorExt};
pub use types::{Error, Result};
