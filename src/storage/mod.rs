pub mod backend;
pub mod drafts;
pub mod errors;
pub mod repository;

#[cfg(test)]
pub mod test_helpers;

pub use backend::{ApiResponse, CommentBackend, CommentTable, FileBackend, MemoryBackend, Policy};
pub use drafts::{DraftKey, DraftStore, Drafts, FileDraftStore, MemoryDraftStore};
pub use errors::{CommentError, CommentResult, DraftError, DraftResult};
pub use repository::{CommentRepository, SubscriptionId};
