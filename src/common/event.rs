use std::sync::Arc;

use crate::common::{Comment, CommentId};

/// Change notification delivered to repository observers
///
/// Events are published after the mutation has been applied, so an observer
/// reading the repository from its callback sees the new state.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent {
    Added(Arc<Comment>),
    Updated(Arc<Comment>),
    Removed(CommentId),
    Cleared,
}

impl RepositoryEvent {
    pub fn comment_id(&self) -> Option<&str> {
        match self {
            RepositoryEvent::Added(comment) => Some(&comment.id),
            RepositoryEvent::Updated(comment) => Some(&comment.id),
            RepositoryEvent::Removed(id) => Some(id),
            RepositoryEvent::Cleared => None,
        }
    }
}
