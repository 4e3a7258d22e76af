use anyhow::Result;
use clap::Args;

use crate::cli::output::{format_thread_compact, info_message};

use super::Session;

#[derive(Args)]
pub struct ListArgs {
    /// Only resolved threads
    #[arg(long, conflicts_with = "unresolved")]
    pub resolved: bool,

    /// Only unresolved threads
    #[arg(long)]
    pub unresolved: bool,

    /// Only threads anchored inline
    #[arg(long)]
    pub inpage: bool,
}

pub async fn handle_list(session: &Session, args: ListArgs) -> Result<()> {
    session.load_document().await?;
    let repository = &session.repository;
    let document_id = &session.document_id;

    let threads = if args.resolved {
        repository.resolved_threads_in_document(document_id)
    } else if args.unresolved {
        repository.unresolved_threads_in_document(document_id)
    } else if args.inpage {
        repository.threads_in_document_inpage_only(document_id)
    } else {
        repository.threads_in_document(document_id)
    };

    let threads: Vec<_> = threads
        .into_iter()
        .filter(|thread| !args.inpage || thread.is_inpage)
        .collect();

    if threads.is_empty() {
        println!("{}", info_message(&format!("No threads in {}", document_id)));
        return Ok(());
    }

    for thread in &threads {
        let comment_count = repository.in_thread(&thread.id).len();
        println!("{}", format_thread_compact(thread, comment_count));
    }

    let unresolved = repository.unresolved_comments_in_document_count(document_id);
    println!(
        "\n{}",
        info_message(&format!(
            "{} unresolved comment{}",
            unresolved,
            if unresolved == 1 { "" } else { "s" }
        ))
    );
    Ok(())
}
