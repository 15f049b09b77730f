pub mod analyzer;
pub mod heuristics;

pub use analyzer::SignalDetector;
pub use heuristics::DetectorParams;
