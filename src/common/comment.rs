use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::common::{CommentId, DocumentId, UserId};

/// Where a thread lives relative to the document body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    /// Anchored inside the document content by an inline thread node
    Inpage,
    /// Shown in the margin/sidebar only
    Margin,
}

impl Placement {
    pub fn from_inpage(is_inpage: bool) -> Self {
        if is_inpage {
            Placement::Inpage
        } else {
            Placement::Margin
        }
    }

    pub fn matches(self, comment: &Comment) -> bool {
        comment.placement() == self
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Inpage => write!(f, "inpage"),
            Placement::Margin => write!(f, "margin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub document_id: DocumentId,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
    pub created_by_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by_id: Option<UserId>,
    #[serde(default)]
    pub is_inpage: bool,
    #[serde(default)]
    pub is_new: bool,
    /// Last typing timestamp per user. Presence is never persisted.
    #[serde(skip)]
    pub typing_users: HashMap<UserId, DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl Comment {
    pub fn is_thread_root(&self) -> bool {
        self.parent_comment_id.is_none()
    }

    /// The id anchors and replies use to reference this comment's thread
    pub fn thread_id(&self) -> &str {
        self.parent_comment_id.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn belongs_to_thread(&self, thread_id: &str) -> bool {
        self.id == thread_id || self.parent_comment_id.as_deref() == Some(thread_id)
    }

    pub fn placement(&self) -> Placement {
        Placement::from_inpage(self.is_inpage)
    }

    pub fn set_typing(&mut self, user_id: UserId, at: DateTime<Utc>) {
        self.typing_users.insert(user_id, at);
    }

    /// Users who typed within `ttl` of `now`, sorted by id
    pub fn currently_typing(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .typing_users
            .iter()
            .filter(|(_, last)| now - **last < ttl)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    pub fn prune_typing(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.typing_users.retain(|_, last| now - *last < ttl);
    }

    /// Ordering key shared by every ordered view
    pub(crate) fn chronological_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Payload sent to the backing store to create a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDraft {
    pub id: CommentId,
    pub document_id: DocumentId,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
    pub data: serde_json::Value,
    #[serde(default)]
    pub is_inpage: bool,
}

impl CommentDraft {
    pub fn thread(
        id: impl Into<CommentId>,
        document_id: impl Into<DocumentId>,
        data: serde_json::Value,
        is_inpage: bool,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            parent_comment_id: None,
            data,
            is_inpage,
        }
    }

    pub fn reply(
        id: impl Into<CommentId>,
        document_id: impl Into<DocumentId>,
        thread_id: impl Into<CommentId>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            parent_comment_id: Some(thread_id.into()),
            data,
            is_inpage: false,
        }
    }

    /// Build the unconfirmed local comment shown while the create is pending
    pub fn into_pending(self, author: UserId) -> Comment {
        let now = Utc::now();
        Comment {
            id: self.id,
            document_id: self.document_id,
            parent_comment_id: self.parent_comment_id,
            created_by_id: author,
            created_at: now,
            updated_at: now,
            is_resolved: false,
            resolved_at: None,
            resolved_by_id: None,
            is_inpage: self.is_inpage,
            is_new: true,
            typing_users: HashMap::new(),
            data: self.data,
        }
    }
}
