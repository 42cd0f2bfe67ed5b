//! Ingestion: upload validation and the asynchronous indexing pipeline.

mod dedup;
mod queue;

pub use dedup::{prepare, resolve_format, UploadFields};
pub use queue::IndexingQueue;
