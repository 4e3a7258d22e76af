use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use crate::anchor::{AnchorState, InpageThread, InpageThreadNode};
use crate::cli::output::{info_message, success_message};

use super::Session;

#[derive(Args)]
pub struct AnchorArgs {
    /// Thread id to anchor (a new id is generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Markdown file to append the anchor token to
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

pub async fn handle_anchor(session: &Session, args: AnchorArgs) -> Result<()> {
    let anchor = match args.id {
        Some(id) => InpageThread::new(id)?,
        None => InpageThread::generate(),
    };

    if let Some(path) = &args.file {
        let mut markdown = if path.exists() {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            String::new()
        };
        anchor.write_markdown(&mut markdown);
        fs::write(path, markdown).with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "{}",
            info_message(&format!("Appended anchor to {}", path.display()))
        );
    }

    // Rendering the node is what brings its thread into existence
    let context = session.context();
    let node = InpageThreadNode::new(move |node: &InpageThread| context.view(node));
    let mut view = node.render(&anchor);

    match view.materialize().await {
        AnchorState::Ready(thread) => {
            println!(
                "{}",
                success_message(&format!("Thread {} is ready", thread.id))
            );
            println!("{}", anchor.to_markdown());
            Ok(())
        }
        AnchorState::Unavailable(err) => {
            anyhow::bail!("No comments available for {}: {}", anchor.id(), err)
        }
        AnchorState::Pending => anyhow::bail!("Thread {} is still pending", anchor.id()),
    }
}
