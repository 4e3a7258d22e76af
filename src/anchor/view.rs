use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

use super::node::InpageThread;
use crate::common::{Comment, CommentDraft, DocumentId, UserId, new_comment_id};
use crate::presence::TypingEmitter;
use crate::storage::{CommentError, CommentRepository, CommentResult, DraftKey, Drafts};
use crate::thread::{ThreadItem, thread_items};

/// Session services every thread view in one document shares
#[derive(Clone)]
pub struct ThreadContext {
    pub repository: Arc<CommentRepository>,
    pub emitter: Arc<TypingEmitter>,
    pub drafts: Drafts,
    pub document_id: DocumentId,
    pub typing_ttl: Duration,
}

impl ThreadContext {
    pub fn new(
        repository: Arc<CommentRepository>,
        emitter: Arc<TypingEmitter>,
        drafts: Drafts,
        document_id: impl Into<DocumentId>,
    ) -> Self {
        Self {
            repository,
            emitter,
            drafts,
            document_id: document_id.into(),
            typing_ttl: Duration::milliseconds(3000),
        }
    }

    pub fn with_typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing_ttl = ttl;
        self
    }

    /// Build the view for an anchor found in this document
    pub fn view(&self, node: &InpageThread) -> InpageThreadView {
        InpageThreadView::new(self.clone(), node.clone())
    }
}

/// Where an anchor's thread is in its lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorState {
    /// Not resolved yet; renders a placeholder
    Pending,
    Ready(Arc<Comment>),
    /// Neither fetch nor create succeeded; stays here until `retry`
    Unavailable(CommentError),
}

/// Live view of the thread behind one inline anchor
///
/// The view holds the anchor id and reads every snapshot from the repository,
/// so it never diverges from what other views of the same thread see.
pub struct InpageThreadView {
    context: ThreadContext,
    node: InpageThread,
    state: AnchorState,
    focused: bool,
}

impl InpageThreadView {
    pub fn new(context: ThreadContext, node: InpageThread) -> Self {
        Self {
            context,
            node,
            state: AnchorState::Pending,
            focused: false,
        }
    }

    pub fn node(&self) -> &InpageThread {
        &self.node
    }

    pub fn state(&self) -> &AnchorState {
        &self.state
    }

    /// Resolve the anchor to its thread root, creating the thread if needed
    ///
    /// Calling again after the first resolution does nothing; an unavailable
    /// anchor is only retried through [`InpageThreadView::retry`].
    pub async fn materialize(&mut self) -> &AnchorState {
        if !matches!(self.state, AnchorState::Pending) {
            return &self.state;
        }

        let repository = &self.context.repository;
        let result = match repository.get(self.node.id()) {
            Some(held) => Ok(held),
            None => repository.fetch_or_create(self.seed_draft()).await,
        };

        self.state = match result {
            Ok(thread) => {
                debug!("Anchor {} ready", self.node.id());
                self.focused = thread.is_new;
                AnchorState::Ready(thread)
            }
            Err(err) => {
                warn!("Thread {} unavailable: {}", self.node.id(), err);
                AnchorState::Unavailable(err)
            }
        };
        &self.state
    }

    /// User-initiated retry after the anchor became unavailable
    pub async fn retry(&mut self) -> &AnchorState {
        if matches!(self.state, AnchorState::Unavailable(_)) {
            self.state = AnchorState::Pending;
        }
        self.materialize().await
    }

    /// Current snapshot of the thread root, once the anchor is resolved
    pub fn thread(&self) -> Option<Arc<Comment>> {
        match &self.state {
            AnchorState::Ready(thread) => self
                .context
                .repository
                .get(&thread.id)
                .or_else(|| Some(Arc::clone(thread))),
            _ => None,
        }
    }

    pub fn replies(&self) -> Vec<ThreadItem> {
        match &self.state {
            AnchorState::Ready(_) => {
                let id = self.node.id();
                thread_items(&self.context.repository.in_thread_inpage_only(id), id)
            }
            _ => Vec::new(),
        }
    }

    /// Other users typing in this thread right now
    pub fn typing_users(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let viewer = self.context.repository.viewer();
        self.thread()
            .map(|thread| thread.currently_typing(now, self.context.typing_ttl))
            .unwrap_or_default()
            .into_iter()
            .filter(|user| user != viewer)
            .collect()
    }

    pub fn signal_typing(&self) -> bool {
        let thread = self.thread();
        self.context
            .emitter
            .signal(&self.context.document_id, thread.as_ref().map(|t| t.id.as_str()))
    }

    // Reply form

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    /// Whether the store lets the viewer reply; allowed until a policy says otherwise
    pub fn can_reply(&self) -> bool {
        self.thread().is_some_and(|thread| {
            self.context
                .repository
                .policy(&thread.id)
                .is_none_or(|policy| policy.allows("comment"))
        })
    }

    /// The reply form shows while focused or while the thread has no replies
    pub fn shows_form(&self) -> bool {
        self.can_reply() && (self.focused || self.replies().is_empty())
    }

    /// Draft slot for this thread; none until the thread id is known
    pub fn draft_key(&self) -> Option<DraftKey> {
        self.thread()
            .map(|thread| DraftKey::new(self.context.document_id.clone(), thread.id.clone()))
    }

    pub fn draft(&self) -> Option<Value> {
        self.draft_key().and_then(|key| self.context.drafts.load(&key))
    }

    pub fn save_draft(&self, content: &Value) -> bool {
        self.draft_key()
            .is_some_and(|key| self.context.drafts.save(&key, content))
    }

    pub fn clear_draft(&self) {
        if let Some(key) = self.draft_key() {
            self.context.drafts.clear(&key);
        }
    }

    /// Submit a reply; the draft is cleared once the store accepted it
    pub async fn reply(&mut self, data: Value) -> CommentResult<Arc<Comment>> {
        let thread = self
            .thread()
            .ok_or_else(|| CommentError::not_found(self.node.id()))?;
        if !self.can_reply() {
            return Err(CommentError::validation(format!(
                "replies to thread {} are not allowed",
                thread.id
            )));
        }

        let draft = CommentDraft::reply(
            new_comment_id(),
            self.context.document_id.clone(),
            thread.id.clone(),
            data,
        );
        let created = self.context.repository.create(draft).await?;

        self.clear_draft();
        self.focused = false;
        Ok(created)
    }

    fn seed_draft(&self) -> CommentDraft {
        CommentDraft::thread(
            self.node.id(),
            self.context.document_id.clone(),
            self.node.to_content(),
            true,
        )
    }
}
