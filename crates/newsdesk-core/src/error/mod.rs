//! Error types for the analysis subsystem
//!
//! A single error enum covers every failure stage so callers can tell
//! transport, provider, configuration, decode, prompt, and storage
//! failures apart without string matching. Status codes are preserved
//! wherever one was observed, because the key-rotation engine and the
//! transport retry policy both classify on them.

mod classifiers;
mod constructors;
mod types;

pub use types::{NewsdeskError, NewsdeskResult, ResultExt};
