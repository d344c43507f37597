//! Requirement-driven anonymization engine.
//!
//! A policy document is resolved against the function catalog, every
//! selected table is checked against its metadata, and rows are rewritten in
//! batches through a read/write session pair.

pub mod engine;
pub mod errors;
pub mod exclude;
pub mod memory;
pub mod postgres;
pub mod processor;
pub mod query;
pub mod report;
pub mod requirement;
pub mod session;

pub use engine::{AnonymizeOptions, DEFAULT_BATCH_SIZE, DEFAULT_SAMPLE_LIMIT, anonymize};
pub use errors::{AnonymizeError, SessionError, error_chain};
pub use memory::{MemoryDatabase, MemoryReadSession, MemoryTable, MemoryWriteSession};
pub use postgres::{PgReadSession, PgWriteSession};
pub use report::{RunReport, TableOutcome, TableReport, TableStage, TableStats};
pub use requirement::ResolvedRequirement;
pub use session::{ReadSession, Row, WriteSession};
