//! Detection layer: the [`Detector`] seam and the orchestrator that merges
//! every detector's findings into one [`DetectionResult`].

mod execution;
mod options;
mod orchestrator;
mod recommendations;
mod result;

use crate::taxonomy::{DetectionMethod, HallucinationCategory};
use thiserror::Error;

pub use execution::ExecutionFindings;
pub use options::DetectionOptions;
pub use orchestrator::{DETECTION_VERSION, Orchestrator};
pub use recommendations::{Recommendation, generate_recommendations};
pub use result::{DetectionMetadata, DetectionResult};

/// Failure of a single detector. The orchestrator logs it and carries on.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{method} detector failed: {message}")]
pub struct DetectorError {
    pub method: DetectionMethod,
    pub message: String,
}

impl DetectorError {
    pub fn new(method: DetectionMethod, message: impl Into<String>) -> Self {
        Self {
            method,
            message: message.into(),
        }
    }
}

/// A source of hallucination categories.
pub trait Detector {
    fn method(&self) -> DetectionMethod;

    fn detect(&self, code: &str) -> Result<Vec<HallucinationCategory>, DetectorError>;
}
