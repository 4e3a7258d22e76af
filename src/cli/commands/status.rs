use anyhow::Result;
use clap::Args;

use crate::cli::output::success_message;

use super::Session;

#[derive(Args)]
pub struct StatusArgs {
    /// Thread to update
    pub thread: String,
}

pub async fn handle_resolve(session: &Session, args: StatusArgs) -> Result<()> {
    session.load_document().await?;
    let thread = session.repository.resolve(&args.thread).await?;

    println!(
        "{}",
        success_message(&format!("Resolved thread {}", thread.id))
    );
    Ok(())
}

pub async fn handle_unresolve(session: &Session, args: StatusArgs) -> Result<()> {
    session.load_document().await?;
    let thread = session.repository.unresolve(&args.thread).await?;

    println!(
        "{}",
        success_message(&format!("Reopened thread {}", thread.id))
    );
    Ok(())
}
