use anyhow::Result;
use clap::Args;

use crate::cli::output::success_message;

use super::Session;

#[derive(Args)]
pub struct DeleteArgs {
    /// Comment to delete; deleting a thread removes its replies
    pub id: String,
}

pub async fn handle_delete(session: &Session, args: DeleteArgs) -> Result<()> {
    session.load_document().await?;
    session.repository.delete(&args.id).await?;

    println!("{}", success_message(&format!("Deleted {}", args.id)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::test_support::*;
    use crate::common::content::text_document;

    #[tokio::test]
    async fn test_delete_thread_with_replies() {
        let (temp_dir, session) = setup_temp_session();
        let mut view = session.thread_view("t1").await.unwrap();
        view.reply(text_document("reply")).await.unwrap();

        let args = DeleteArgs {
            id: "t1".to_string(),
        };
        handle_delete(&session, args).await.expect("Delete should succeed");
        assert!(session.repository.is_empty());

        let other = session_as(&temp_dir, "bob");
        other.load_document().await.unwrap();
        assert!(other.repository.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_comment_fails() {
        let (_temp_dir, session) = setup_temp_session();
        let args = DeleteArgs {
            id: "missing".to_string(),
        };
        assert!(handle_delete(&session, args).await.is_err());
    }
}
