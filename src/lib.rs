//! filedex: local-first file indexing engine
//!
//! - Storage (embedded SQLite, migrations, optional sqlite-vec embeddings)
//! - Engine (directory scanner, scan orchestrator, events)
//! - Commands (the surface a presentation layer calls into)

pub mod classify;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod state;
pub mod storage;

pub use commands::{App, CommandResult};
pub use config::StorageConfig;
pub use engine::{EventSink, NullSink, ScanEvent, ScanOutcome};
pub use error::{IndexError, Result};
pub use storage::{
    FileDescriptor, FileRecord, FileUpdate, Modality, ScanHistoryEntry, ScanStatus, SearchCriteria,
    SimilarityHit,
};
