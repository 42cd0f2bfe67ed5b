//! Query orchestration and ranking.
//!
//! - `basis`: search bases, combined priority and vector-field mapping
//! - `query`: projection of a search input into an embedding space
//! - `compose`: free-text criteria into vector lists for one basis
//! - `rank`: dual-basis rescoring for combined search
//! - `orchestrator`: per-request dispatch and result assembly

mod basis;
mod compose;
mod orchestrator;
mod query;
mod rank;

pub use basis::{CombinedPriority, SearchBasis, VectorField};
pub use compose::{compose, ComposedQuery};
pub use orchestrator::{
    advanced_search, image_search, random_search, recall, similar_search, text_search, QueryId,
    SearchOutcome,
};
pub use query::{produce, QueryInput};
pub use rank::rescore;
