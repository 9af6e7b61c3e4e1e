//! Record normalization: id assignment and batching.

mod assign;
mod batch;

pub use assign::{AssignError, Document, IdAssigner, RESERVED_ID_FIELD};
pub use batch::{batched, Batches};
