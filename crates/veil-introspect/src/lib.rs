//! Table metadata providers.

pub mod adapter;
pub mod errors;
pub mod memory;
pub mod options;
pub mod postgres;

pub use adapter::MetadataProvider;
pub use errors::MetadataError;
pub use memory::StaticMetadata;
pub use options::MetadataOptions;
pub use postgres::PostgresMetadata;
