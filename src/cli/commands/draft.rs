use anyhow::Result;
use clap::Args;

use crate::cli::output::{info_message, success_message};
use crate::common::content::plain_text;
use crate::storage::DraftKey;

use super::Session;

#[derive(Args)]
pub struct DraftArgs {
    /// Thread whose draft to show
    pub thread: String,

    /// Discard the draft
    #[arg(long)]
    pub clear: bool,
}

pub async fn handle_draft(session: &Session, args: DraftArgs) -> Result<()> {
    let key = DraftKey::new(session.document_id.clone(), args.thread.clone());

    if args.clear {
        session.drafts.clear(&key);
        println!(
            "{}",
            success_message(&format!("Discarded draft {}", key.storage_key()))
        );
        return Ok(());
    }

    match session.drafts.load(&key) {
        Some(draft) => println!("{}", plain_text(&draft)),
        None => println!(
            "{}",
            info_message(&format!("No draft for thread {}", args.thread))
        ),
    }
    Ok(())
}
