use uuid::Uuid;

pub type UserId = String;
pub type DocumentId = String;
pub type CommentId = String;

/// Fresh id for a thread or reply created on this client
pub fn new_comment_id() -> CommentId {
    Uuid::new_v4().to_string()
}
