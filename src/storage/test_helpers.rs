//! Shared fixtures for repository, anchor and CLI tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::backend::{ApiResponse, CommentBackend, MemoryBackend};
use super::errors::{CommentError, CommentResult};
use crate::common::{Comment, CommentDraft};

pub const TEST_DOCUMENT: &str = "doc-1";
pub const TEST_VIEWER: &str = "alice";

/// Fixed base instant so ordering tests are deterministic
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
}

pub fn create_test_comment(id: &str) -> Comment {
    CommentBuilder::root(id).build()
}

pub struct CommentBuilder {
    comment: Comment,
}

impl CommentBuilder {
    pub fn root(id: &str) -> Self {
        Self {
            comment: Comment {
                id: id.to_string(),
                document_id: TEST_DOCUMENT.to_string(),
                parent_comment_id: None,
                created_by_id: TEST_VIEWER.to_string(),
                created_at: at(0),
                updated_at: at(0),
                is_resolved: false,
                resolved_at: None,
                resolved_by_id: None,
                is_inpage: false,
                is_new: false,
                typing_users: HashMap::new(),
                data: json!({"type": "doc", "content": []}),
            },
        }
    }

    pub fn reply(id: &str, thread_id: &str) -> Self {
        let mut builder = Self::root(id);
        builder.comment.parent_comment_id = Some(thread_id.to_string());
        builder
    }

    pub fn document(mut self, document_id: &str) -> Self {
        self.comment.document_id = document_id.to_string();
        self
    }

    pub fn by(mut self, user: &str) -> Self {
        self.comment.created_by_id = user.to_string();
        self
    }

    pub fn at(mut self, seconds: i64) -> Self {
        self.comment.created_at = at(seconds);
        self.comment.updated_at = at(seconds);
        self
    }

    pub fn inpage(mut self) -> Self {
        self.comment.is_inpage = true;
        self
    }

    pub fn resolved(mut self) -> Self {
        self.comment.is_resolved = true;
        self.comment.resolved_at = Some(self.comment.created_at);
        self
    }

    pub fn unsubmitted(mut self) -> Self {
        self.comment.is_new = true;
        self
    }

    pub fn build(self) -> Comment {
        self.comment
    }
}

pub fn inpage_draft(id: &str) -> CommentDraft {
    CommentDraft::thread(id, TEST_DOCUMENT, json!({"type": "doc", "content": []}), true)
}

/// Backend wrapper that counts calls, injects latency and fails on demand
pub struct ScriptedBackend {
    pub inner: MemoryBackend,
    pub delay: Option<std::time::Duration>,
    pub fail_create: AtomicBool,
    pub fail_info: AtomicBool,
    pub fail_resolve: AtomicBool,
    /// Strip the "comment" ability from create responses
    pub deny_comment: AtomicBool,
    pub create_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            delay: None,
            fail_create: AtomicBool::new(false),
            fail_info: AtomicBool::new(false),
            fail_resolve: AtomicBool::new(false),
            deny_comment: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Some(std::time::Duration::from_millis(millis));
        self
    }

    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn info_count(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    async fn round_trip(&self, fail: &AtomicBool) -> CommentResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if fail.load(Ordering::SeqCst) {
            return Err(CommentError::backend_unavailable("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl CommentBackend for ScriptedBackend {
    async fn create(&self, draft: CommentDraft) -> CommentResult<ApiResponse> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip(&self.fail_create).await?;
        let mut response = self.inner.create(draft).await?;
        if self.deny_comment.load(Ordering::SeqCst) {
            for policy in &mut response.policies {
                policy.abilities.insert("comment".to_string(), false);
            }
        }
        Ok(response)
    }

    async fn resolve(&self, id: &str) -> CommentResult<ApiResponse> {
        self.round_trip(&self.fail_resolve).await?;
        self.inner.resolve(id).await
    }

    async fn unresolve(&self, id: &str) -> CommentResult<ApiResponse> {
        self.round_trip(&self.fail_resolve).await?;
        self.inner.unresolve(id).await
    }

    async fn info(&self, id: &str) -> CommentResult<Option<Comment>> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip(&self.fail_info).await?;
        self.inner.info(id).await
    }

    async fn list(&self, document_id: &str) -> CommentResult<Vec<Comment>> {
        self.round_trip(&self.fail_info).await?;
        self.inner.list(document_id).await
    }

    async fn delete(&self, id: &str) -> CommentResult<()> {
        self.round_trip(&self.fail_create).await?;
        self.inner.delete(id).await
    }
}
