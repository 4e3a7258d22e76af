use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

mod anchor;
mod delete;
mod draft;
mod list;
mod markdown;
mod new;
mod reply;
mod show;
mod status;

pub use anchor::{AnchorArgs, handle_anchor};
pub use delete::{DeleteArgs, handle_delete};
pub use draft::{DraftArgs, handle_draft};
pub use list::{ListArgs, handle_list};
pub use markdown::{MarkdownArgs, ParseArgs, handle_markdown, handle_parse};
pub use new::{NewArgs, handle_new};
pub use reply::{ReplyArgs, handle_reply};
pub use show::{ShowArgs, handle_show};
pub use status::{StatusArgs, handle_resolve, handle_unresolve};

use crate::anchor::{AnchorState, InpageThread, InpageThreadView, ThreadContext};
use crate::common::{EnvProvider, SystemEnvProvider};
use crate::config::{CONFIG_FILE_NAME, Settings};
use crate::presence::{ChannelTransport, TypingEmitter, TypingEvent};
use crate::storage::{CommentError, CommentRepository, Drafts, FileBackend, FileDraftStore};

#[derive(Parser)]
#[command(name = "inpage-threads")]
#[command(about = "Inline comment threads anchored in documents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// Directory holding comments, drafts and config.yaml
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Settings file (defaults to <data-dir>/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user (defaults to INPAGE_THREADS_USER, then USER)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Document the threads belong to
    #[arg(short, long, global = true, default_value = "default")]
    pub document: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new thread
    New(NewArgs),
    /// Place an inline anchor and materialize its thread
    Anchor(AnchorArgs),
    /// Reply to a thread
    Reply(ReplyArgs),
    /// Mark a thread resolved
    Resolve(StatusArgs),
    /// Reopen a resolved thread
    Unresolve(StatusArgs),
    /// Delete a comment, or a thread with all its replies
    Delete(DeleteArgs),
    /// List threads in the document
    List(ListArgs),
    /// Show a thread with its replies
    Show(ShowArgs),
    /// Show or discard the reply draft of a thread
    Draft(DraftArgs),
    /// Print the markdown token of a thread anchor
    Markdown(MarkdownArgs),
    /// List thread anchors found in a markdown file
    Parse(ParseArgs),
}

/// Everything one command invocation works against
pub struct Session {
    pub settings: Settings,
    pub document_id: String,
    pub repository: Arc<CommentRepository>,
    pub drafts: Drafts,
    emitter: Arc<TypingEmitter>,
    // Keeps the local presence channel open for the session's lifetime
    _typing_events: mpsc::UnboundedReceiver<TypingEvent>,
}

impl Session {
    pub fn open(settings: Settings, document_id: impl Into<String>) -> Result<Self> {
        let viewer = settings.viewer()?.to_string();
        let backend = Arc::new(FileBackend::open(&settings.data_dir, viewer.clone()));
        let repository = Arc::new(CommentRepository::new(backend, viewer));
        let drafts = Drafts::new(Arc::new(FileDraftStore::new(settings.drafts_dir())));

        let (transport, typing_events) = ChannelTransport::channel();
        let emitter = Arc::new(TypingEmitter::with_window(
            Arc::new(transport),
            settings.typing_debounce(),
        ));

        Ok(Self {
            settings,
            document_id: document_id.into(),
            repository,
            drafts,
            emitter,
            _typing_events: typing_events,
        })
    }

    pub fn context(&self) -> ThreadContext {
        ThreadContext::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.emitter),
            self.drafts.clone(),
            self.document_id.clone(),
        )
        .with_typing_ttl(self.settings.typing_ttl())
    }

    /// Populate the repository with every comment of the document
    pub async fn load_document(&self) -> Result<()> {
        self.repository
            .fetch_document(&self.document_id)
            .await
            .with_context(|| format!("Failed to load comments for {}", self.document_id))?;
        Ok(())
    }

    /// A thread view resolved against the document, created if missing
    pub async fn thread_view(&self, thread_id: &str) -> Result<InpageThreadView> {
        let anchor = InpageThread::new(thread_id)?;
        let mut view = self.context().view(&anchor);
        if let AnchorState::Unavailable(err) = view.materialize().await {
            anyhow::bail!("Thread {} is unavailable: {}", thread_id, err);
        }
        Ok(view)
    }

    /// A view of a thread root the document already has; never creates one
    pub async fn existing_thread_view(&self, thread_id: &str) -> Result<InpageThreadView> {
        let thread = match self.repository.get(thread_id) {
            Some(held) => Some(held),
            None => self.repository.fetch(thread_id).await?,
        }
        .filter(|thread| thread.document_id == self.document_id)
        .ok_or_else(|| CommentError::not_found(thread_id))?;

        if !thread.is_thread_root() {
            anyhow::bail!(
                "{} is a reply; use its thread {} instead",
                thread_id,
                thread.thread_id()
            );
        }
        self.thread_view(thread_id).await
    }
}

pub async fn run_command(cli: Cli) -> Result<()> {
    run_command_with_env(cli, SystemEnvProvider).await
}

pub async fn run_command_with_env(cli: Cli, env_provider: impl EnvProvider) -> Result<()> {
    match cli.command {
        // Token helpers work without a user or data directory
        Commands::Markdown(args) => handle_markdown(args),
        Commands::Parse(args) => handle_parse(args),
        command => {
            let session = open_session(&cli.global, &env_provider)?;
            let result = run_in_session(&session, command).await;
            session.repository.close();
            result
        }
    }
}

async fn run_in_session(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::New(args) => handle_new(session, args).await,
        Commands::Anchor(args) => handle_anchor(session, args).await,
        Commands::Reply(args) => handle_reply(session, args).await,
        Commands::Resolve(args) => handle_resolve(session, args).await,
        Commands::Unresolve(args) => handle_unresolve(session, args).await,
        Commands::Delete(args) => handle_delete(session, args).await,
        Commands::List(args) => handle_list(session, args).await,
        Commands::Show(args) => handle_show(session, args).await,
        Commands::Draft(args) => handle_draft(session, args).await,
        Commands::Markdown(args) => handle_markdown(args),
        Commands::Parse(args) => handle_parse(args),
    }
}

pub(crate) fn open_session(
    global: &GlobalArgs,
    env_provider: &impl EnvProvider,
) -> Result<Session> {
    let config_path = global.config.clone().or_else(|| {
        global
            .data_dir
            .as_ref()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    });
    let settings = Settings::load(config_path.as_deref(), env_provider)?
        .with_overrides(global.user.clone(), global.data_dir.clone());
    Session::open(settings, global.document.clone())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::common::MockEnvProvider;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "inpage-threads",
            "list",
            "--unresolved",
            "--document",
            "doc-7",
            "--user",
            "bob",
        ])
        .expect("Should parse");

        assert_eq!(cli.global.document, "doc-7");
        assert_eq!(cli.global.user.as_deref(), Some("bob"));
        assert!(matches!(cli.command, Commands::List(ListArgs { unresolved: true, .. })));
    }

    #[test]
    fn test_session_requires_a_user() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temporary directory");
        let global = GlobalArgs {
            data_dir: Some(temp_dir.path().to_path_buf()),
            document: "doc-1".to_string(),
            ..GlobalArgs::default()
        };
        assert!(open_session(&global, &MockEnvProvider::new()).is_err());
        assert!(open_session(&global, &MockEnvProvider::with_viewer("alice")).is_ok());
    }

    #[tokio::test]
    async fn test_thread_view_creates_missing_thread() {
        let (_temp_dir, session) = setup_temp_session();

        let view = session.thread_view("t1").await.unwrap();
        assert_eq!(view.thread().unwrap().id, "t1");
        assert!(session.thread_view("bad id").await.is_err());
    }

    #[tokio::test]
    async fn test_existing_thread_view_never_creates() {
        let (_temp_dir, session) = setup_temp_session();

        let err = session.existing_thread_view("t1").await.err().unwrap();
        assert!(err.to_string().contains("not found"));
        assert!(session.repository.is_empty());

        session.thread_view("t1").await.unwrap();
        let view = session.existing_thread_view("t1").await.unwrap();
        assert_eq!(view.thread().unwrap().id, "t1");
    }

    #[tokio::test]
    async fn test_run_command_end_to_end() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temporary directory");
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "user: from-config\n",
        )
        .unwrap();
        let data_dir = temp_dir.path().to_string_lossy().to_string();

        let cli = Cli::try_parse_from([
            "inpage-threads",
            "new",
            "--body",
            "hello",
            "--data-dir",
            &data_dir,
        ])
        .unwrap();
        run_command_with_env(cli, MockEnvProvider::new())
            .await
            .expect("New should run with the user from config.yaml");
        assert!(temp_dir.path().join(FileBackend::FILE_NAME).exists());

        // Token helpers need no session
        let cli = Cli::try_parse_from(["inpage-threads", "markdown", "t1"]).unwrap();
        run_command_with_env(cli, MockEnvProvider::new())
            .await
            .expect("Markdown should run without a user");
    }
}
