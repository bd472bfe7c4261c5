//! # Utility Functions (`utils`)
//!
//! Loading of parameter dumps and the thread helpers it runs on.

pub mod parallel;
pub mod serialization;

pub use serialization::{fill_params, FillReport, LoadOptions, SerializationError};
