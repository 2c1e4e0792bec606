//! Lexis SDK
//!
//! Shared types and errors for the Lexis evaluation engine. Provider
//! adapters, the store and the CLI all speak this vocabulary.

/// Error types and handling
pub mod errors;

/// Dimensions, capabilities, CEFR levels and severities
pub mod types;

pub use errors::{EngineError, LexisErrorExt};
pub use types::{Capability, CefrLevel, Dimension, Severity};
