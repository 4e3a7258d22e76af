//! Typing presence: throttled outbound signals and inbound application.
//!
//! Nothing here schedules timers. Staleness is decided by readers through
//! `Comment::currently_typing` with the configured TTL.

use log::trace;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::common::{CommentId, DocumentId, UserId};
use crate::storage::CommentRepository;

pub const DEFAULT_TYPING_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    #[error("Presence channel closed")]
    ChannelClosed,

    #[error("Presence transport error: {0}")]
    Transport(String),
}

pub type PresenceResult<T> = Result<T, PresenceError>;

/// Outbound "typing" notification for one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEvent {
    pub document_id: DocumentId,
    pub comment_id: CommentId,
}

/// A typing notification received from another session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTyping {
    pub event: TypingEvent,
    pub user_id: UserId,
}

/// Real-time channel the emitter writes to
pub trait TypingTransport: Send + Sync {
    fn emit(&self, event: &TypingEvent) -> PresenceResult<()>;
}

/// Transport backed by an unbounded tokio channel
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<TypingEvent>,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::UnboundedSender<TypingEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TypingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl TypingTransport for ChannelTransport {
    fn emit(&self, event: &TypingEvent) -> PresenceResult<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| PresenceError::ChannelClosed)
    }
}

/// Leading-edge throttle over a typing transport
///
/// The first keystroke for a thread is sent at once; further keystrokes for
/// the same thread inside the window are dropped.
pub struct TypingEmitter {
    transport: Arc<dyn TypingTransport>,
    window: Duration,
    last_sent: Mutex<HashMap<CommentId, Instant>>,
}

impl TypingEmitter {
    pub fn new(transport: Arc<dyn TypingTransport>) -> Self {
        Self::with_window(transport, DEFAULT_TYPING_DEBOUNCE)
    }

    pub fn with_window(transport: Arc<dyn TypingTransport>, window: Duration) -> Self {
        Self {
            transport,
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Signal typing now; returns whether an event went out
    pub fn signal(&self, document_id: &str, comment_id: Option<&str>) -> bool {
        self.signal_at(document_id, comment_id, Instant::now())
    }

    pub fn signal_at(&self, document_id: &str, comment_id: Option<&str>, now: Instant) -> bool {
        // No thread id yet: the anchor has not materialized
        let Some(comment_id) = comment_id else {
            return false;
        };

        {
            let mut last_sent = self.last_sent.lock();
            if let Some(previous) = last_sent.get(comment_id) {
                if now.saturating_duration_since(*previous) < self.window {
                    return false;
                }
            }
            last_sent.insert(comment_id.to_string(), now);
        }

        let event = TypingEvent {
            document_id: document_id.to_string(),
            comment_id: comment_id.to_string(),
        };
        match self.transport.emit(&event) {
            Ok(()) => true,
            Err(err) => {
                trace!("Dropped typing signal for {}: {}", comment_id, err);
                false
            }
        }
    }
}

/// Record an inbound typing notification on the repository
pub fn apply_inbound(repository: &CommentRepository, inbound: &InboundTyping) {
    repository.set_typing(&inbound.event.comment_id, &inbound.user_id);
}

/// Apply inbound notifications until the channel closes
pub async fn run_inbound(
    mut receiver: mpsc::UnboundedReceiver<InboundTyping>,
    repository: Arc<CommentRepository>,
) {
    while let Some(inbound) = receiver.recv().await {
        if repository.is_closed() {
            break;
        }
        apply_inbound(&repository, &inbound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use crate::storage::test_helpers::*;

    struct FailingTransport;

    impl TypingTransport for FailingTransport {
        fn emit(&self, _event: &TypingEvent) -> PresenceResult<()> {
            Err(PresenceError::Transport("socket disconnected".to_string()))
        }
    }

    #[test]
    fn test_leading_edge_throttle() {
        let (transport, mut rx) = ChannelTransport::channel();
        let emitter = TypingEmitter::new(Arc::new(transport));
        let start = Instant::now();

        assert!(emitter.signal_at(TEST_DOCUMENT, Some("t1"), start));
        assert!(!emitter.signal_at(TEST_DOCUMENT, Some("t1"), start + Duration::from_millis(100)));
        assert!(!emitter.signal_at(TEST_DOCUMENT, Some("t1"), start + Duration::from_millis(499)));
        assert!(emitter.signal_at(TEST_DOCUMENT, Some("t1"), start + Duration::from_millis(500)));
        // Other threads have their own window
        assert!(emitter.signal_at(TEST_DOCUMENT, Some("t2"), start + Duration::from_millis(500)));

        let mut sent = Vec::new();
        while let Ok(event) = rx.try_recv() {
            sent.push(event.comment_id);
        }
        assert_eq!(sent, vec!["t1", "t1", "t2"]);
    }

    #[test]
    fn test_signal_without_thread_is_suppressed() {
        let (transport, mut rx) = ChannelTransport::channel();
        let emitter = TypingEmitter::new(Arc::new(transport));

        assert!(!emitter.signal(TEST_DOCUMENT, None));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_transport_failures_are_swallowed() {
        let emitter = TypingEmitter::new(Arc::new(FailingTransport));
        assert!(!emitter.signal(TEST_DOCUMENT, Some("t1")));

        let (transport, rx) = ChannelTransport::channel();
        drop(rx);
        let emitter = TypingEmitter::new(Arc::new(transport));
        assert!(!emitter.signal(TEST_DOCUMENT, Some("t1")));
    }

    #[tokio::test]
    async fn test_inbound_typing_updates_repository() {
        let backend = MemoryBackend::new(TEST_VIEWER);
        backend.insert(create_test_comment("t1"));
        let repository = Arc::new(CommentRepository::new(Arc::new(backend), TEST_VIEWER));
        repository.fetch("t1").await.unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(run_inbound(rx, Arc::clone(&repository)));

        let event = TypingEvent {
            document_id: TEST_DOCUMENT.to_string(),
            comment_id: "t1".to_string(),
        };
        tx.send(InboundTyping {
            event: event.clone(),
            user_id: "bob".to_string(),
        })
        .unwrap();
        tx.send(InboundTyping {
            event: TypingEvent {
                comment_id: "unknown".to_string(),
                ..event
            },
            user_id: "bob".to_string(),
        })
        .unwrap();
        drop(tx);
        pump.await.unwrap();

        let thread = repository.get("t1").unwrap();
        assert!(thread.typing_users.contains_key("bob"));
        assert!(repository.get("unknown").is_none());
    }
}
