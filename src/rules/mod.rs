pub mod builtin;
pub mod engine;
pub mod index;
pub mod types;

pub use engine::PatternMatcher;
pub use index::ScanIndex;
pub use types::*;
