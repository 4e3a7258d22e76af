use anyhow::Result;
use clap::Args;

use crate::anchor::InpageThreadView;
use crate::cli::output::{success_message, warning_message};
use crate::common::content::{plain_text, text_document};

use super::Session;

const TEMPLATE_MARKER: &str = "# ";

#[derive(Args)]
pub struct ReplyArgs {
    /// Thread to reply to
    pub thread: String,

    /// Reply text; opens $EDITOR with the saved draft when omitted
    #[arg(short, long)]
    pub body: Option<String>,
}

pub async fn handle_reply(session: &Session, args: ReplyArgs) -> Result<()> {
    session.load_document().await?;
    let mut view = session.existing_thread_view(&args.thread).await?;
    view.focus();

    let body = match args.body {
        Some(body) => body,
        None => compose_in_editor(&view)?,
    };

    let body = body.trim();
    if body.is_empty() {
        anyhow::bail!("Reply is empty; nothing was sent");
    }

    let reply = view.reply(text_document(body)).await?;
    println!(
        "{}",
        success_message(&format!("Replied to {} as {}", args.thread, reply.id))
    );
    Ok(())
}

/// Edit the reply, saving the text as a draft before it is sent
fn compose_in_editor(view: &InpageThreadView) -> Result<String> {
    let initial = view
        .draft()
        .map(|draft| plain_text(&draft))
        .unwrap_or_default();

    let edited = edit::edit(create_template(&initial))?;
    let body = strip_template(&edited);

    if !body.trim().is_empty() && !view.save_draft(&text_document(&body)) {
        println!(
            "{}",
            warning_message("Could not save the draft; it will be lost if sending fails")
        );
    }
    Ok(body)
}

fn create_template(draft: &str) -> String {
    format!(
        "{}\n{}Write your reply above. Lines starting with '#' are ignored.\n",
        draft, TEMPLATE_MARKER
    )
}

fn strip_template(edited: &str) -> String {
    edited
        .lines()
        .filter(|line| !line.starts_with(TEMPLATE_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
