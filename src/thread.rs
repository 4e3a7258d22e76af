//! Display ordering and grouping for the replies of one thread.
//!
//! Input is always an already ordered sequence from the repository; nothing
//! here sorts again.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::common::Comment;

/// One rendered reply with its grouping flags
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadItem {
    pub comment: Arc<Comment>,
    pub first_of_thread: bool,
    pub last_of_thread: bool,
    /// Author differs from the previous reply
    pub first_of_author: bool,
    /// Author differs from the next reply
    pub last_of_author: bool,
    pub previous_created_at: Option<DateTime<Utc>>,
}

/// Replies shown under a thread: the root, unsubmitted and parentless entries are dropped
pub fn display_replies(comments: &[Arc<Comment>], thread_id: &str) -> Vec<Arc<Comment>> {
    comments
        .iter()
        .filter(|c| c.id != thread_id && !c.is_new && c.parent_comment_id.is_some())
        .cloned()
        .collect()
}

pub fn layout(replies: &[Arc<Comment>]) -> Vec<ThreadItem> {
    let last = replies.len().saturating_sub(1);

    replies
        .iter()
        .enumerate()
        .map(|(index, comment)| {
            let previous = index.checked_sub(1).map(|i| &replies[i]);
            let next = replies.get(index + 1);

            ThreadItem {
                comment: Arc::clone(comment),
                first_of_thread: index == 0,
                last_of_thread: index == last,
                first_of_author: previous.is_none_or(|p| p.created_by_id != comment.created_by_id),
                last_of_author: next.is_none_or(|n| n.created_by_id != comment.created_by_id),
                previous_created_at: previous.map(|p| p.created_at),
            }
        })
        .collect()
}

pub fn thread_items(comments: &[Arc<Comment>], thread_id: &str) -> Vec<ThreadItem> {
    layout(&display_replies(comments, thread_id))
}
