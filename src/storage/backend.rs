use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::{CommentError, CommentResult};
use crate::common::{Comment, CommentDraft, CommentId, UserId};

/// Abilities the backing store grants the acting user on one comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: CommentId,
    pub abilities: BTreeMap<String, bool>,
}

impl Policy {
    pub fn allows(&self, ability: &str) -> bool {
        self.abilities.get(ability).copied().unwrap_or(false)
    }
}

/// Response envelope for mutating calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub data: Comment,
    #[serde(default)]
    pub policies: Vec<Policy>,
}

/// Remote comment store consumed by the repository
///
/// Mirrors the `comments.*` endpoints: `create`, `resolve`, `unresolve` and
/// `info`, plus the document-level listing that streams replies in and an
/// explicit delete.
#[async_trait]
pub trait CommentBackend: Send + Sync {
    async fn create(&self, draft: CommentDraft) -> CommentResult<ApiResponse>;

    async fn resolve(&self, id: &str) -> CommentResult<ApiResponse>;

    async fn unresolve(&self, id: &str) -> CommentResult<ApiResponse>;

    /// `Ok(None)` when the store has no comment with this id
    async fn info(&self, id: &str) -> CommentResult<Option<Comment>>;

    async fn list(&self, document_id: &str) -> CommentResult<Vec<Comment>>;

    async fn delete(&self, id: &str) -> CommentResult<()>;
}

/// Server-side comment rules shared by the in-memory and file backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentTable {
    comments: BTreeMap<CommentId, Comment>,
}

impl CommentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Store a comment as-is, bypassing validation
    pub fn insert(&mut self, comment: Comment) {
        self.comments.insert(comment.id.clone(), comment);
    }

    pub fn create(&mut self, draft: CommentDraft, actor: &str) -> CommentResult<ApiResponse> {
        if draft.id.trim().is_empty() {
            return Err(CommentError::validation("comment id must not be empty"));
        }
        if draft.document_id.trim().is_empty() {
            return Err(CommentError::validation("document id must not be empty"));
        }
        if draft.data.is_null() {
            return Err(CommentError::validation("comment data must not be empty"));
        }
        if self.comments.contains_key(&draft.id) {
            return Err(CommentError::conflict(&draft.id));
        }

        let mut is_inpage = draft.is_inpage;
        if let Some(parent_id) = &draft.parent_comment_id {
            let parent = self.comments.get(parent_id).ok_or_else(|| {
                CommentError::validation(format!("parent comment {} not found", parent_id))
            })?;
            if !parent.is_thread_root() {
                return Err(CommentError::validation("replies cannot be nested"));
            }
            if parent.document_id != draft.document_id {
                return Err(CommentError::validation(
                    "reply must belong to the same document as its thread",
                ));
            }
            // Replies inherit the thread's placement
            is_inpage = parent.is_inpage;
        }

        let now = Utc::now();
        let comment = Comment {
            id: draft.id,
            document_id: draft.document_id,
            parent_comment_id: draft.parent_comment_id,
            created_by_id: actor.to_string(),
            created_at: now,
            updated_at: now,
            is_resolved: false,
            resolved_at: None,
            resolved_by_id: None,
            is_inpage,
            is_new: false,
            typing_users: HashMap::new(),
            data: draft.data,
        };

        self.comments.insert(comment.id.clone(), comment.clone());
        Ok(Self::respond(comment, actor))
    }

    pub fn set_resolved(
        &mut self,
        id: &str,
        resolved: bool,
        actor: &str,
    ) -> CommentResult<ApiResponse> {
        let comment = self
            .comments
            .get_mut(id)
            .ok_or_else(|| CommentError::not_found(id))?;

        if !comment.is_thread_root() {
            return Err(CommentError::validation("only thread roots can be resolved"));
        }

        let now = Utc::now();
        comment.is_resolved = resolved;
        comment.resolved_at = resolved.then_some(now);
        comment.resolved_by_id = resolved.then(|| actor.to_string());
        comment.updated_at = now;

        Ok(Self::respond(comment.clone(), actor))
    }

    pub fn info(&self, id: &str) -> Option<Comment> {
        self.comments.get(id).cloned()
    }

    pub fn list(&self, document_id: &str) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .comments
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.chronological_key().cmp(&b.chronological_key()));
        comments
    }

    /// Delete a comment; deleting a thread root removes its replies too
    pub fn delete(&mut self, id: &str) -> CommentResult<()> {
        let comment = self
            .comments
            .remove(id)
            .ok_or_else(|| CommentError::not_found(id))?;

        if comment.is_thread_root() {
            self.comments
                .retain(|_, c| c.parent_comment_id.as_deref() != Some(id));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> CommentResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write through a temp file in the same directory so readers never see a partial file
    pub fn save(&self, path: &Path) -> CommentResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp_file, self)?;
        temp_file.flush()?;
        temp_file.persist(path)?;
        Ok(())
    }

    fn respond(comment: Comment, actor: &str) -> ApiResponse {
        let is_author = comment.created_by_id == actor;
        let is_root = comment.is_thread_root();

        let mut abilities = BTreeMap::new();
        abilities.insert("read".to_string(), true);
        abilities.insert("comment".to_string(), is_root);
        abilities.insert("update".to_string(), is_author);
        abilities.insert("delete".to_string(), is_author);
        abilities.insert("resolve".to_string(), is_root && !comment.is_resolved);
        abilities.insert("unresolve".to_string(), is_root && comment.is_resolved);

        let policy = Policy {
            id: comment.id.clone(),
            abilities,
        };
        ApiResponse {
            data: comment,
            policies: vec![policy],
        }
    }
}

/// In-process backend; clones made with `as_user` share the same table
#[derive(Clone)]
pub struct MemoryBackend {
    table: Arc<Mutex<CommentTable>>,
    actor: UserId,
}

impl MemoryBackend {
    pub fn new(actor: impl Into<UserId>) -> Self {
        Self {
            table: Arc::new(Mutex::new(CommentTable::new())),
            actor: actor.into(),
        }
    }

    /// Another session against the same store, acting as a different user
    pub fn as_user(&self, actor: impl Into<UserId>) -> Self {
        Self {
            table: Arc::clone(&self.table),
            actor: actor.into(),
        }
    }

    pub fn insert(&self, comment: Comment) {
        self.table.lock().insert(comment);
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

#[async_trait]
impl CommentBackend for MemoryBackend {
    async fn create(&self, draft: CommentDraft) -> CommentResult<ApiResponse> {
        self.table.lock().create(draft, &self.actor)
    }

    async fn resolve(&self, id: &str) -> CommentResult<ApiResponse> {
        self.table.lock().set_resolved(id, true, &self.actor)
    }

    async fn unresolve(&self, id: &str) -> CommentResult<ApiResponse> {
        self.table.lock().set_resolved(id, false, &self.actor)
    }

    async fn info(&self, id: &str) -> CommentResult<Option<Comment>> {
        Ok(self.table.lock().info(id))
    }

    async fn list(&self, document_id: &str) -> CommentResult<Vec<Comment>> {
        Ok(self.table.lock().list(document_id))
    }

    async fn delete(&self, id: &str) -> CommentResult<()> {
        self.table.lock().delete(id)
    }
}

/// Backend persisted to a single JSON file, used by the command line tool
pub struct FileBackend {
    path: PathBuf,
    actor: UserId,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileBackend {
    pub const FILE_NAME: &'static str = "comments.json";

    pub fn open(data_dir: impl AsRef<Path>, actor: impl Into<UserId>) -> Self {
        Self {
            path: data_dir.as_ref().join(Self::FILE_NAME),
            actor: actor.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_table<T, F>(&self, persist: bool, op: F) -> CommentResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CommentTable, &str) -> CommentResult<T> + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let actor = self.actor.clone();

        tokio::task::spawn_blocking(move || -> CommentResult<T> {
            let mut table = CommentTable::load(&path)?;
            let result = op(&mut table, &actor)?;
            if persist {
                table.save(&path)?;
                debug!("Saved {} comments to {}", table.len(), path.display());
            }
            Ok(result)
        })
        .await
        .map_err(|e| CommentError::backend_unavailable(e.to_string()))?
    }
}

#[async_trait]
impl CommentBackend for FileBackend {
    async fn create(&self, draft: CommentDraft) -> CommentResult<ApiResponse> {
        self.with_table(true, move |table, actor| table.create(draft, actor))
            .await
    }

    async fn resolve(&self, id: &str) -> CommentResult<ApiResponse> {
        let id = id.to_string();
        self.with_table(true, move |table, actor| table.set_resolved(&id, true, actor))
            .await
    }

    async fn unresolve(&self, id: &str) -> CommentResult<ApiResponse> {
        let id = id.to_string();
        self.with_table(true, move |table, actor| table.set_resolved(&id, false, actor))
            .await
    }

    async fn info(&self, id: &str) -> CommentResult<Option<Comment>> {
        let id = id.to_string();
        self.with_table(false, move |table, _| Ok(table.info(&id)))
            .await
    }

    async fn list(&self, document_id: &str) -> CommentResult<Vec<Comment>> {
        let document_id = document_id.to_string();
        self.with_table(false, move |table, _| Ok(table.list(&document_id)))
            .await
    }

    async fn delete(&self, id: &str) -> CommentResult<()> {
        let id = id.to_string();
        self.with_table(true, move |table, _| table.delete(&id)).await
    }
}
