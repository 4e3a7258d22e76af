use anyhow::Result;
use chrono::Utc;
use clap::Args;

use crate::cli::output::format_thread_detailed;
use crate::storage::CommentError;
use crate::thread::thread_items;

use super::Session;

#[derive(Args)]
pub struct ShowArgs {
    /// Thread to show
    pub thread: String,
}

pub async fn handle_show(session: &Session, args: ShowArgs) -> Result<()> {
    session.load_document().await?;
    let comment = session
        .repository
        .get(&args.thread)
        .ok_or_else(|| CommentError::not_found(&args.thread))?;
    // A reply id shows its whole thread
    let thread = session
        .repository
        .get(comment.thread_id())
        .unwrap_or(comment);

    let replies = thread_items(&session.repository.in_thread_ordered(&thread.id), &thread.id);
    let now = Utc::now();
    let typing: Vec<String> = thread
        .currently_typing(now, session.settings.typing_ttl())
        .into_iter()
        .filter(|user| user != session.repository.viewer())
        .collect();

    print!("{}", format_thread_detailed(&thread, &replies, &typing, now));
    Ok(())
}
