//! Helpers for the rich-text payload carried in `Comment::data`.
//!
//! The payload is an editor document tree (`{"type": ..., "content": [...]}`)
//! and stays opaque to the thread engine; these helpers only build and flatten it.

use serde_json::{Value, json};

/// Wrap plain text into a single-paragraph document
pub fn text_document(text: &str) -> Value {
    let paragraphs: Vec<Value> = text
        .split("\n\n")
        .map(|paragraph| {
            let paragraph = paragraph.trim_matches('\n');
            if paragraph.is_empty() {
                json!({ "type": "paragraph" })
            } else {
                json!({
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": paragraph }],
                })
            }
        })
        .collect();

    json!({ "type": "doc", "content": paragraphs })
}

/// Flatten a document tree to text, one line per block
pub fn plain_text(value: &Value) -> String {
    let mut blocks = Vec::new();
    collect_blocks(value, &mut blocks);
    blocks.join("\n")
}

pub fn is_empty(value: &Value) -> bool {
    plain_text(value).trim().is_empty()
}

fn collect_blocks(value: &Value, blocks: &mut Vec<String>) {
    match value {
        Value::String(text) => blocks.push(text.clone()),
        Value::Array(nodes) => nodes.iter().for_each(|node| collect_blocks(node, blocks)),
        Value::Object(node) => {
            if let Some(Value::String(text)) = node.get("text") {
                blocks.push(text.clone());
                return;
            }

            let children = node.get("content").and_then(Value::as_array);
            let is_textblock = children
                .map(|nodes| nodes.iter().all(|n| n.get("text").is_some()))
                .unwrap_or(false);

            match children {
                Some(nodes) if is_textblock => {
                    let line: String = nodes
                        .iter()
                        .filter_map(|n| n.get("text").and_then(Value::as_str))
                        .collect();
                    blocks.push(line);
                }
                Some(nodes) => nodes.iter().for_each(|n| collect_blocks(n, blocks)),
                None => {}
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_document_round_trips_to_plain_text() {
        let doc = text_document("First line\n\nSecond paragraph");
        assert_eq!(doc["type"], "doc");
        assert_eq!(doc["content"].as_array().unwrap().len(), 2);
        assert_eq!(plain_text(&doc), "First line\nSecond paragraph");
    }

    #[test]
    fn test_plain_text_joins_inline_marks() {
        let doc = json!({
            "type": "doc",
            "content": [{
                "type": "paragraph",
                "content": [
                    { "type": "text", "text": "Hello " },
                    { "type": "text", "text": "world", "marks": [{ "type": "strong" }] },
                ],
            }],
        });
        assert_eq!(plain_text(&doc), "Hello world");
    }

    #[test]
    fn test_is_empty() {
        assert!(is_empty(&Value::Null));
        assert!(is_empty(&json!({ "type": "doc", "content": [{ "type": "paragraph" }] })));
        assert!(!is_empty(&text_document("hi")));
    }
}
