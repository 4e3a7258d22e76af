use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use crate::anchor::InpageThread;
use crate::cli::output::info_message;

#[derive(Args)]
pub struct MarkdownArgs {
    /// Thread id
    pub id: String,

    /// Print the DOM and plain text forms as well
    #[arg(long)]
    pub all_forms: bool,
}

#[derive(Args)]
pub struct ParseArgs {
    /// Markdown file to scan
    pub file: PathBuf,
}

pub fn handle_markdown(args: MarkdownArgs) -> Result<()> {
    let anchor = InpageThread::new(args.id)?;

    println!("{}", anchor.to_markdown());
    if args.all_forms {
        println!("{}", anchor.to_html());
        println!("{}", anchor.to_plain_text());
    }
    Ok(())
}

pub fn handle_parse(args: ParseArgs) -> Result<()> {
    let markdown = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let anchors = InpageThread::parse_all(&markdown);
    if anchors.is_empty() {
        println!(
            "{}",
            info_message(&format!("No thread anchors in {}", args.file.display()))
        );
    }
    for anchor in anchors {
        println!("{}", anchor.id());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_markdown_rejects_blank_id() {
        let args = MarkdownArgs {
            id: String::new(),
            all_forms: false,
        };
        assert!(handle_markdown(args).is_err());

        let args = MarkdownArgs {
            id: "t1".to_string(),
            all_forms: true,
        };
        assert!(handle_markdown(args).is_ok());
    }

    #[test]
    fn test_parse_file() {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        let path = temp_dir.path().join("doc.md");
        fs::write(&path, "# Title\n\n[t1](t1)\n").unwrap();

        assert!(handle_parse(ParseArgs { file: path }).is_ok());
        assert!(
            handle_parse(ParseArgs {
                file: temp_dir.path().join("missing.md")
            })
            .is_err()
        );
    }
}
