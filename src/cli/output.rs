use chrono::{DateTime, Utc};
use console::{Color, style};
use std::time::Duration;

use crate::common::content::plain_text;
use crate::common::{Comment, UserId};
use crate::thread::ThreadItem;

fn format_time_ago(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        return format!(
            "{} second{}",
            total_seconds,
            if total_seconds == 1 { "" } else { "s" }
        );
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" });
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{} hour{}", hours, if hours == 1 { "" } else { "s" });
    }

    let days = hours / 24;
    format!("{} day{}", days, if days == 1 { "" } else { "s" })
}

fn ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    format_time_ago((now - at).to_std().unwrap_or_default())
}

/// First paragraph of a comment body plus the number of words left out
fn truncate_to_first_paragraph(text: &str) -> (String, Option<usize>) {
    let mut paragraphs = text.splitn(2, '\n');
    let first = paragraphs.next().unwrap_or_default().trim().to_string();
    let remaining_words = paragraphs
        .next()
        .map(|rest| rest.split_whitespace().count())
        .filter(|count| *count > 0);
    (first, remaining_words)
}

pub fn format_resolution(comment: &Comment) -> console::StyledObject<&'static str> {
    if comment.is_resolved {
        style("RESOLVED").fg(Color::Green)
    } else {
        style("OPEN").fg(Color::Yellow)
    }
}

pub fn format_thread_compact(thread: &Comment, comment_count: usize) -> String {
    let (summary, _) = truncate_to_first_paragraph(&plain_text(&thread.data));
    let summary = if summary.is_empty() {
        style("(no text)".to_string()).dim().to_string()
    } else {
        summary
    };

    format!(
        "{} [{}] {} {} {}",
        style(&thread.id).bold(),
        format_resolution(thread),
        style(thread.placement()).magenta(),
        summary,
        style(format!(
            "({} comment{})",
            comment_count,
            if comment_count == 1 { "" } else { "s" }
        ))
        .dim()
    )
}

/// Root header, grouped replies and the typing line
pub fn format_thread_detailed(
    thread: &Comment,
    replies: &[ThreadItem],
    typing: &[UserId],
    now: DateTime<Utc>,
) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Thread {} [{}] {}\n",
        style(&thread.id).bold().cyan(),
        format_resolution(thread),
        style(thread.placement()).magenta()
    ));
    output.push_str(&format!(
        "Started by: {}, {} ago ({})\n",
        style(&thread.created_by_id).green(),
        ago(thread.created_at, now),
        thread.created_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if let (Some(by), Some(at)) = (&thread.resolved_by_id, thread.resolved_at) {
        output.push_str(&format!(
            "Resolved by: {}, {} ago\n",
            style(by).green(),
            ago(at, now)
        ));
    }

    let body = plain_text(&thread.data);
    if !body.trim().is_empty() {
        output.push_str(&format!("\n{}\n", body));
    }

    if !replies.is_empty() {
        output.push('\n');
    }
    for item in replies {
        let comment = &item.comment;
        if item.first_of_author {
            output.push_str(&format!(
                "  {} {}\n",
                style(&comment.created_by_id).green().bold(),
                style(format!("{} ago", ago(comment.created_at, now))).dim()
            ));
        }
        for line in plain_text(&comment.data).lines() {
            output.push_str(&format!("    {}\n", line));
        }
        if item.last_of_author && !item.last_of_thread {
            output.push('\n');
        }
    }

    if !typing.is_empty() {
        output.push_str(&format!(
            "\n{}\n",
            style(format!("{} typing...", typing.join(", "))).italic().dim()
        ));
    }

    output
}

pub fn success_message(message: &str) -> String {
    format!("{} {}", style("✓").green().bold(), message)
}

pub fn error_message(message: &str) -> String {
    format!("{} {}", style("✗").red().bold(), message)
}

pub fn warning_message(message: &str) -> String {
    format!("{} {}", style("⚠").yellow().bold(), message)
}

pub fn info_message(message: &str) -> String {
    format!("{} {}", style("ℹ").blue().bold(), message)
}
