//! Inline thread anchors: the document node and its render-triggered view.

pub mod node;
pub mod view;

pub use node::{InpageThread, InpageThreadNode, NodeComponent};
pub use view::{AnchorState, InpageThreadView, ThreadContext};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnchorError {
    #[error("Invalid thread id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("Invalid thread markdown: {0}")]
    InvalidMarkdown(String),

    #[error("Invalid thread content: {0}")]
    InvalidContent(String),
}

impl AnchorError {
    pub fn invalid_id(id: impl AsRef<str>, reason: impl AsRef<str>) -> Self {
        AnchorError::InvalidId {
            id: id.as_ref().to_string(),
            reason: reason.as_ref().to_string(),
        }
    }
}

pub type AnchorResult<T> = Result<T, AnchorError>;
