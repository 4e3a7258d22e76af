//! Inline comment threads anchored in collaborative documents.
//!
//! The [`storage::CommentRepository`] owns every comment of a session,
//! [`anchor`] turns inline `thread` nodes into live thread views, and
//! [`presence`] carries typing signals between sessions.

pub mod anchor;
pub mod cli;
pub mod common;
pub mod config;
pub mod presence;
pub mod storage;
pub mod thread;
