use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::backend::{ApiResponse, CommentBackend, Policy};
use super::errors::{CommentError, CommentResult};
use crate::common::{Comment, CommentDraft, CommentId, Placement, RepositoryEvent, UserId};

type Observer = Arc<dyn Fn(&RepositoryEvent) + Send + Sync>;

/// Handle returned by [`CommentRepository::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Session-scoped, observable collection of every known comment
///
/// `CommentRepository` is the single owner of comment state for one client
/// session. Anchors and views hold thread ids and ask the repository for the
/// current snapshot instead of keeping copies.
///
/// ## Consistency
///
/// - **Snapshots**: comments are stored as `Arc<Comment>` and replaced on
///   mutation, so a reader never sees a half-updated comment.
/// - **One entry per id**: creates and fetches for the same id are serialized
///   through a per-id async lock. A second caller waits for the first and then
///   finds the entry already held.
/// - **Remote first**: `create`, `resolve` and `unresolve` change local state
///   only after the backing store confirmed; a failed call leaves the
///   repository untouched.
/// - **Notifications**: observers run synchronously after the mutation has
///   been applied and all locks are released.
///
/// ## Example Usage
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use inpage_threads::common::CommentDraft;
/// use inpage_threads::storage::{CommentRepository, MemoryBackend};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = Arc::new(MemoryBackend::new("alice"));
/// let comments = CommentRepository::new(backend, "alice");
///
/// let draft = CommentDraft::thread("t1", "doc-1", serde_json::json!({"type": "doc"}), true);
/// let thread = comments.fetch_or_create(draft).await?;
/// comments.resolve(&thread.id).await?;
/// assert_eq!(comments.resolved_threads_in_document("doc-1").len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct CommentRepository {
    backend: Arc<dyn CommentBackend>,
    viewer: UserId,
    data: RwLock<HashMap<CommentId, Arc<Comment>>>,
    policies: RwLock<HashMap<CommentId, Policy>>,
    observers: RwLock<Vec<(SubscriptionId, Observer)>>,
    next_subscription: AtomicU64,
    in_flight: Mutex<HashMap<CommentId, Arc<tokio::sync::Mutex<()>>>>,
    closed: AtomicBool,
}

/// Exclusive claim on one comment id for the duration of a round trip
struct IdGuard<'a> {
    repository: &'a CommentRepository,
    id: CommentId,
    _guard: tokio::sync::OwnedMutexGuard<()>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.repository.in_flight.lock();
        // The map and this guard hold the only references when nobody is waiting
        if in_flight
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            in_flight.remove(&self.id);
        }
    }
}

impl CommentRepository {
    pub fn new(backend: Arc<dyn CommentBackend>, viewer: impl Into<UserId>) -> Self {
        Self {
            backend,
            viewer: viewer.into(),
            data: RwLock::new(HashMap::new()),
            policies: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            in_flight: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// The user this session renders for
    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Comment>> {
        self.data.read().get(id).cloned()
    }

    /// Latest abilities the backing store reported for a comment
    pub fn policy(&self, id: &str) -> Option<Policy> {
        self.policies.read().get(id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // Mutations

    /// Create a comment in the backing store and add the confirmed result
    ///
    /// If the id is already held (and confirmed) the held entry is returned
    /// without a round trip.
    pub async fn create(&self, draft: CommentDraft) -> CommentResult<Arc<Comment>> {
        self.ensure_open()?;
        let _guard = self.claim(&draft.id).await;
        self.create_claimed(draft).await
    }

    /// Load a single comment; `Ok(None)` when the store does not know the id
    pub async fn fetch(&self, id: &str) -> CommentResult<Option<Arc<Comment>>> {
        self.ensure_open()?;
        let _guard = self.claim(id).await;
        self.fetch_claimed(id).await
    }

    /// Resolve a thread id to a held comment, loading or creating it as needed
    ///
    /// Runs get, fetch and create under one claim on the id, so concurrent
    /// callers for the same thread converge on a single root. A transport
    /// failure while fetching falls through to create. When another session
    /// won the create, the stored thread is loaded instead; any other create
    /// failure is returned and leaves the repository unchanged.
    pub async fn fetch_or_create(&self, draft: CommentDraft) -> CommentResult<Arc<Comment>> {
        self.ensure_open()?;
        let _guard = self.claim(&draft.id).await;

        if let Some(existing) = self.get(&draft.id) {
            if !existing.is_new {
                return Ok(existing);
            }
        }

        match self.fetch_claimed(&draft.id).await {
            Ok(Some(comment)) => return Ok(comment),
            Ok(None) => debug!("Thread {} not found, creating it", draft.id),
            Err(err) if err.is_transient() => {
                warn!("Fetching thread {} failed ({}), trying create", draft.id, err)
            }
            Err(err) => return Err(err),
        }

        let id = draft.id.clone();
        match self.create_claimed(draft).await {
            Err(err) if err.is_conflict() => {
                debug!("Thread {} was created elsewhere, loading it", id);
                self.fetch_claimed(&id).await?.ok_or(err)
            }
            result => result,
        }
    }

    /// Load every comment of a document from the backing store
    pub async fn fetch_document(&self, document_id: &str) -> CommentResult<Vec<Arc<Comment>>> {
        self.ensure_open()?;
        let comments = self.backend.list(document_id).await?;
        self.ensure_open()?;

        debug!(
            "Loaded {} comments for document {}",
            comments.len(),
            document_id
        );
        Ok(comments.into_iter().map(|c| self.upsert(c)).collect())
    }

    pub async fn resolve(&self, id: &str) -> CommentResult<Arc<Comment>> {
        self.set_resolved(id, true).await
    }

    pub async fn unresolve(&self, id: &str) -> CommentResult<Arc<Comment>> {
        self.set_resolved(id, false).await
    }

    /// Delete remotely, then drop the comment (and a root's replies) locally
    pub async fn delete(&self, id: &str) -> CommentResult<()> {
        self.ensure_open()?;
        let _guard = self.claim(id).await;

        self.backend.delete(id).await?;
        self.ensure_open()?;

        let is_root = self.get(id).is_none_or(|c| c.is_thread_root());
        if is_root {
            let replies: Vec<CommentId> = self
                .collect_ordered(|c| c.parent_comment_id.as_deref() == Some(id))
                .into_iter()
                .map(|c| c.id.clone())
                .collect();
            for reply in replies {
                self.remove(&reply);
            }
        }
        self.remove(id);
        Ok(())
    }

    /// Add an unconfirmed local comment authored by the viewer
    ///
    /// The placeholder is marked `is_new` and stays hidden from other viewers'
    /// thread lists. A later successful `create` with the same id replaces it.
    pub fn add_pending(&self, draft: CommentDraft) -> CommentResult<Arc<Comment>> {
        self.ensure_open()?;
        if let Some(existing) = self.get(&draft.id) {
            return Ok(existing);
        }
        let draft = self.conform_reply(draft)?;
        Ok(self.upsert(draft.into_pending(self.viewer.clone())))
    }

    /// Record that `user_id` is typing in a comment's thread; no network involved
    pub fn set_typing(&self, comment_id: &str, user_id: &str) {
        self.set_typing_at(comment_id, user_id, Utc::now());
    }

    pub fn set_typing_at(&self, comment_id: &str, user_id: &str, at: DateTime<Utc>) {
        let updated = {
            let mut data = self.data.write();
            data.get_mut(comment_id).map(|entry| {
                Arc::make_mut(entry).set_typing(user_id.to_string(), at);
                Arc::clone(entry)
            })
        };

        if let Some(comment) = updated {
            self.notify(&RepositoryEvent::Updated(comment));
        }
    }

    /// Drop a comment from the session without contacting the store
    pub fn remove(&self, id: &str) -> Option<Arc<Comment>> {
        let removed = self.data.write().remove(id);
        self.policies.write().remove(id);
        if removed.is_some() {
            self.notify(&RepositoryEvent::Removed(id.to_string()));
        }
        removed
    }

    pub fn clear(&self) {
        self.data.write().clear();
        self.policies.write().clear();
        self.notify(&RepositoryEvent::Cleared);
    }

    /// Tear the session down; results of in-flight calls are discarded
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing comment session for {}", self.viewer);
            self.clear();
        }
    }

    // Observers

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&RepositoryEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    // Queries

    /// Margin comments in chronological order
    pub fn ordered_data(&self) -> Vec<Arc<Comment>> {
        self.ordered_by_placement(Placement::Margin)
    }

    /// Inline-anchored comments in chronological order
    pub fn ordered_data_inpage_only(&self) -> Vec<Arc<Comment>> {
        self.ordered_by_placement(Placement::Inpage)
    }

    pub fn in_document(&self, document_id: &str) -> Vec<Arc<Comment>> {
        self.collect_ordered(|c| c.document_id == document_id)
    }

    /// Thread roots of a document, hiding other users' unsubmitted roots
    pub fn threads_in_document(&self, document_id: &str) -> Vec<Arc<Comment>> {
        self.collect_ordered(|c| {
            c.document_id == document_id && c.is_thread_root() && self.is_visible(c)
        })
    }

    pub fn threads_in_document_inpage_only(&self, document_id: &str) -> Vec<Arc<Comment>> {
        self.threads_in_document(document_id)
            .into_iter()
            .filter(|c| Placement::Inpage.matches(c))
            .collect()
    }

    pub fn resolved_threads_in_document(&self, document_id: &str) -> Vec<Arc<Comment>> {
        self.threads_in_document(document_id)
            .into_iter()
            .filter(|c| c.is_resolved)
            .collect()
    }

    pub fn unresolved_threads_in_document(&self, document_id: &str) -> Vec<Arc<Comment>> {
        self.threads_in_document(document_id)
            .into_iter()
            .filter(|c| !c.is_resolved)
            .collect()
    }

    /// Number of comments, roots and replies, across all unresolved threads
    pub fn unresolved_comments_in_document_count(&self, document_id: &str) -> usize {
        self.unresolved_threads_in_document(document_id)
            .iter()
            .map(|thread| self.in_thread(&thread.id).len())
            .sum()
    }

    /// Root and replies of a thread
    pub fn in_thread(&self, thread_id: &str) -> Vec<Arc<Comment>> {
        self.collect_ordered(|c| c.belongs_to_thread(thread_id))
    }

    pub fn in_thread_inpage_only(&self, thread_id: &str) -> Vec<Arc<Comment>> {
        self.ordered_data_inpage_only()
            .into_iter()
            .filter(|c| c.belongs_to_thread(thread_id))
            .collect()
    }

    /// Chronological thread view taken from the ordered view matching the root's placement
    pub fn in_thread_ordered(&self, thread_id: &str) -> Vec<Arc<Comment>> {
        let placement = self
            .get(thread_id)
            .map(|root| root.placement())
            .unwrap_or(Placement::Inpage);

        self.ordered_by_placement(placement)
            .into_iter()
            .filter(|c| c.belongs_to_thread(thread_id))
            .collect()
    }

    // Private helper methods

    fn ensure_open(&self) -> CommentResult<()> {
        if self.is_closed() {
            return Err(CommentError::SessionClosed);
        }
        Ok(())
    }

    async fn claim(&self, id: &str) -> IdGuard<'_> {
        let lock = {
            let mut in_flight = self.in_flight.lock();
            Arc::clone(in_flight.entry(id.to_string()).or_default())
        };
        let guard = lock.lock_owned().await;
        IdGuard {
            repository: self,
            id: id.to_string(),
            _guard: guard,
        }
    }

    async fn create_claimed(&self, draft: CommentDraft) -> CommentResult<Arc<Comment>> {
        if let Some(existing) = self.get(&draft.id) {
            if !existing.is_new {
                debug!("Comment {} already held, skipping create", draft.id);
                return Ok(existing);
            }
        }

        let draft = self.conform_reply(draft)?;
        let response = self.backend.create(draft).await?;
        self.ensure_open()?;

        debug!("Created comment {}", response.data.id);
        Ok(self.apply_response(response))
    }

    async fn fetch_claimed(&self, id: &str) -> CommentResult<Option<Arc<Comment>>> {
        let fetched = self.backend.info(id).await?;
        self.ensure_open()?;
        Ok(fetched.map(|comment| self.upsert(comment)))
    }

    async fn set_resolved(&self, id: &str, resolved: bool) -> CommentResult<Arc<Comment>> {
        self.ensure_open()?;
        if let Some(held) = self.get(id) {
            if !held.is_thread_root() {
                return Err(CommentError::validation("only thread roots can be resolved"));
            }
        }

        let _guard = self.claim(id).await;
        let response = if resolved {
            self.backend.resolve(id).await?
        } else {
            self.backend.unresolve(id).await?
        };
        self.ensure_open()?;

        debug!(
            "Comment {} {}",
            id,
            if resolved { "resolved" } else { "unresolved" }
        );
        Ok(self.apply_response(response))
    }

    /// Replies take the document and placement of a held thread root
    fn conform_reply(&self, mut draft: CommentDraft) -> CommentResult<CommentDraft> {
        let Some(parent_id) = draft.parent_comment_id.as_deref() else {
            return Ok(draft);
        };
        let Some(parent) = self.get(parent_id) else {
            return Ok(draft);
        };

        if !parent.is_thread_root() {
            return Err(CommentError::validation("replies cannot be nested"));
        }
        if parent.document_id != draft.document_id {
            return Err(CommentError::validation(
                "reply must belong to the same document as its thread",
            ));
        }
        draft.is_inpage = parent.is_inpage;
        Ok(draft)
    }

    fn apply_response(&self, response: ApiResponse) -> Arc<Comment> {
        {
            let mut policies = self.policies.write();
            for policy in response.policies {
                policies.insert(policy.id.clone(), policy);
            }
        }
        self.upsert(response.data)
    }

    /// Add or replace a comment, keeping presence already recorded locally
    fn upsert(&self, mut comment: Comment) -> Arc<Comment> {
        let (snapshot, event) = {
            let mut data = self.data.write();
            let existed = match data.get(&comment.id) {
                Some(existing) => {
                    if comment.typing_users.is_empty() {
                        comment.typing_users = existing.typing_users.clone();
                    }
                    true
                }
                None => false,
            };

            let snapshot = Arc::new(comment);
            data.insert(snapshot.id.clone(), Arc::clone(&snapshot));
            let event = if existed {
                RepositoryEvent::Updated(Arc::clone(&snapshot))
            } else {
                RepositoryEvent::Added(Arc::clone(&snapshot))
            };
            (snapshot, event)
        };

        self.notify(&event);
        snapshot
    }

    fn is_visible(&self, comment: &Comment) -> bool {
        !comment.is_new || comment.created_by_id == self.viewer
    }

    fn ordered_by_placement(&self, placement: Placement) -> Vec<Arc<Comment>> {
        self.collect_ordered(|c| placement.matches(c))
    }

    /// The one place comments are sorted: `created_at`, then id
    fn collect_ordered<F>(&self, predicate: F) -> Vec<Arc<Comment>>
    where
        F: Fn(&Comment) -> bool,
    {
        let mut comments: Vec<Arc<Comment>> = self
            .data
            .read()
            .values()
            .filter(|c| predicate(c))
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.chronological_key().cmp(&b.chronological_key()));
        comments
    }

    fn notify(&self, event: &RepositoryEvent) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(event);
        }
    }
}
