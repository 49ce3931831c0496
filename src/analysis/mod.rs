//! Structural context for detection.

pub mod flow;
pub mod names;
pub mod source;
pub mod structure;

pub use structure::{CodeStructure, StructureAnalyzer};
