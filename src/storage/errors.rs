use thiserror::Error;

/// Failures surfaced by the comment repository and its backing store
///
/// Cloneable so a single failed round trip can be reported to every caller
/// waiting on the same comment id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommentError {
    #[error("Comment not found: {id}")]
    NotFound { id: String },

    #[error("Comment backend unavailable: {message}")]
    BackendUnavailable { message: String },

    #[error("Invalid comment: {message}")]
    Validation { message: String },

    #[error("Comment already exists: {id}")]
    Conflict { id: String },

    #[error("Comment session has been closed")]
    SessionClosed,

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

impl From<serde_json::Error> for CommentError {
    fn from(err: serde_json::Error) -> Self {
        CommentError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CommentError {
    fn from(err: std::io::Error) -> Self {
        CommentError::Io {
            message: err.to_string(),
        }
    }
}

impl From<tempfile::PersistError> for CommentError {
    fn from(err: tempfile::PersistError) -> Self {
        CommentError::Io {
            message: err.to_string(),
        }
    }
}

impl CommentError {
    pub fn not_found(id: impl AsRef<str>) -> Self {
        CommentError::NotFound {
            id: id.as_ref().to_string(),
        }
    }

    pub fn backend_unavailable(message: impl AsRef<str>) -> Self {
        CommentError::BackendUnavailable {
            message: message.as_ref().to_string(),
        }
    }

    pub fn validation(message: impl AsRef<str>) -> Self {
        CommentError::Validation {
            message: message.as_ref().to_string(),
        }
    }

    pub fn conflict(id: impl AsRef<str>) -> Self {
        CommentError::Conflict {
            id: id.as_ref().to_string(),
        }
    }

    /// Another session created the id first
    pub fn is_conflict(&self) -> bool {
        matches!(self, CommentError::Conflict { .. })
    }

    /// Transport-level failures; the anchor lifecycle falls back to create on these
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CommentError::BackendUnavailable { .. } | CommentError::Io { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum DraftError {
    #[error("Draft storage unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Draft serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist draft: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type CommentResult<T> = Result<T, CommentError>;
pub type DraftResult<T> = Result<T, DraftError>;
