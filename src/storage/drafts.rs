use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::DraftResult;
use crate::common::{CommentId, DocumentId};

/// Identifies the unsent reply text for one thread in one document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub document_id: DocumentId,
    pub thread_id: CommentId,
}

impl DraftKey {
    pub fn new(document_id: impl Into<DocumentId>, thread_id: impl Into<CommentId>) -> Self {
        Self {
            document_id: document_id.into(),
            thread_id: thread_id.into(),
        }
    }

    /// Client storage key, `draft-<documentId>-<threadId>`
    pub fn storage_key(&self) -> String {
        format!("draft-{}-{}", self.document_id, self.thread_id)
    }

    /// File name with each component escaped so distinct keys never collide
    fn file_name(&self) -> String {
        format!(
            "draft-{}-{}.json",
            escape_component(&self.document_id),
            escape_component(&self.thread_id)
        )
    }
}

fn escape_component(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            '-' => escaped.push_str("%2D"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            '.' => escaped.push_str("%2E"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Durable per-thread storage for reply drafts
pub trait DraftStore: Send + Sync {
    fn load(&self, key: &DraftKey) -> DraftResult<Option<Value>>;

    fn save(&self, key: &DraftKey, content: &Value) -> DraftResult<()>;

    /// Removing a draft that does not exist is not an error
    fn clear(&self, key: &DraftKey) -> DraftResult<()>;
}

/// One JSON file per draft inside a directory
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &DraftKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self, key: &DraftKey) -> DraftResult<Option<Value>> {
        let content = match fs::read_to_string(self.path_for(key)) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, key: &DraftKey, content: &Value) -> DraftResult<()> {
        fs::create_dir_all(&self.dir)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut temp_file, content)?;
        temp_file.flush()?;
        temp_file.persist(self.path_for(key))?;

        debug!("Saved draft {}", key.storage_key());
        Ok(())
    }

    fn clear(&self, key: &DraftKey) -> DraftResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<DraftKey, Value>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn load(&self, key: &DraftKey) -> DraftResult<Option<Value>> {
        Ok(self.drafts.lock().get(key).cloned())
    }

    fn save(&self, key: &DraftKey, content: &Value) -> DraftResult<()> {
        self.drafts.lock().insert(key.clone(), content.clone());
        Ok(())
    }

    fn clear(&self, key: &DraftKey) -> DraftResult<()> {
        self.drafts.lock().remove(key);
        Ok(())
    }
}

/// Draft access for views: storage failures behave as "no draft"
#[derive(Clone)]
pub struct Drafts {
    store: Arc<dyn DraftStore>,
}

impl Drafts {
    pub fn new(store: Arc<dyn DraftStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryDraftStore::new()))
    }

    pub fn load(&self, key: &DraftKey) -> Option<Value> {
        match self.store.load(key) {
            Ok(draft) => draft,
            Err(err) => {
                warn!("Could not read draft {}: {}", key.storage_key(), err);
                None
            }
        }
    }

    /// Returns whether the draft was stored
    pub fn save(&self, key: &DraftKey, content: &Value) -> bool {
        match self.store.save(key, content) {
            Ok(()) => true,
            Err(err) => {
                warn!("Could not save draft {}: {}", key.storage_key(), err);
                false
            }
        }
    }

    pub fn clear(&self, key: &DraftKey) {
        if let Err(err) = self.store.clear(key) {
            warn!("Could not clear draft {}: {}", key.storage_key(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_storage_key_format() {
        let key = DraftKey::new("doc-1", "t1");
        assert_eq!(key.storage_key(), "draft-doc-1-t1");
    }

    #[test]
    fn test_file_names_do_not_collide() {
        let a = DraftKey::new("a-b", "c");
        let b = DraftKey::new("a", "b-c");
        assert_eq!(a.storage_key(), b.storage_key());
        assert_ne!(a.file_name(), b.file_name());
        assert_eq!(DraftKey::new("../x", "t").file_name(), "draft-%2E%2E%2Fx-t.json");
    }

    #[test]
    fn test_file_store_round_trip_and_clear() {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        let store = FileDraftStore::new(temp_dir.path().join("drafts"));
        let key = DraftKey::new("doc-1", "t1");

        assert_eq!(store.load(&key).unwrap(), None);

        let draft = json!({"type": "doc", "content": [{"type": "text", "text": "half a thought"}]});
        store.save(&key, &draft).unwrap();
        assert_eq!(store.load(&key).unwrap(), Some(draft));
        assert_eq!(store.load(&DraftKey::new("doc-1", "t2")).unwrap(), None);

        store.clear(&key).unwrap();
        assert_eq!(store.load(&key).unwrap(), None);
        store.clear(&key).expect("Clearing twice should be fine");
    }

    #[test]
    fn test_drafts_degrade_corrupt_file_to_none() {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        let store = FileDraftStore::new(temp_dir.path());
        let key = DraftKey::new("doc-1", "t1");
        fs::write(store.path_for(&key), "{not json").unwrap();

        assert!(store.load(&key).is_err());

        let drafts = Drafts::new(Arc::new(store));
        assert_eq!(drafts.load(&key), None);
    }

    #[test]
    fn test_memory_drafts() {
        let drafts = Drafts::in_memory();
        let key = DraftKey::new("doc-1", "t1");

        assert!(drafts.save(&key, &json!("hello")));
        assert_eq!(drafts.load(&key), Some(json!("hello")));
        drafts.clear(&key);
        assert_eq!(drafts.load(&key), None);
    }

    fn assert_isolated(drafts: &Drafts) {
        let a1 = DraftKey::new("doc-a", "t1");
        assert!(drafts.save(&a1, &json!("in A")));

        assert_eq!(drafts.load(&DraftKey::new("doc-b", "t1")), None);
        assert_eq!(drafts.load(&DraftKey::new("doc-a", "t2")), None);

        let b1 = DraftKey::new("doc-b", "t1");
        assert!(drafts.save(&b1, &json!("in B")));
        drafts.clear(&a1);
        assert_eq!(drafts.load(&a1), None);
        assert_eq!(drafts.load(&b1), Some(json!("in B")));
    }

    #[test]
    fn test_drafts_are_isolated_per_document_and_thread() {
        assert_isolated(&Drafts::in_memory());

        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        assert_isolated(&Drafts::new(Arc::new(FileDraftStore::new(temp_dir.path()))));
    }
}
