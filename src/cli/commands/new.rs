use anyhow::Result;
use clap::Args;

use crate::anchor::InpageThread;
use crate::cli::output::success_message;
use crate::common::CommentDraft;
use crate::common::content::text_document;

use super::Session;

#[derive(Args)]
pub struct NewArgs {
    /// Opening comment text
    #[arg(short, long)]
    pub body: Option<String>,

    /// Show the thread in the margin instead of anchoring it inline
    #[arg(long)]
    pub margin: bool,
}

pub async fn handle_new(session: &Session, args: NewArgs) -> Result<()> {
    let anchor = InpageThread::generate();
    let data = match args.body {
        Some(body) => text_document(&body),
        None => anchor.to_content(),
    };

    let draft = CommentDraft::thread(anchor.id(), session.document_id.clone(), data, !args.margin);
    let thread = session.repository.create(draft).await?;

    println!(
        "{}",
        success_message(&format!("Created {} thread {}", thread.placement(), thread.id))
    );
    if thread.is_inpage {
        println!("{}", anchor.to_markdown());
    }
    Ok(())
}
