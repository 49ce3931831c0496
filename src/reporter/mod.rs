pub mod json;
pub mod terminal;

use crate::detector::DetectionResult;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;

pub trait Reporter {
    fn report(&self, result: &DetectionResult) -> String;
}
