// FILE: src/engine/mod.rs
pub mod events;
pub mod orchestrator;
pub mod scanner;
pub mod searcher;

pub use events::{EventSink, NullSink, ScanEvent};
pub use orchestrator::{ScanOrchestrator, ScanOutcome};
pub use scanner::FileScanner;
pub use searcher::Searcher;
