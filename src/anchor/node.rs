use pulldown_cmark::{Event, LinkType, Parser, Tag, TagEnd};
use serde_json::{Value, json};

use super::{AnchorError, AnchorResult};
use crate::common::{CommentId, new_comment_id};

/// Inline thread anchor embedded in document content
///
/// Carries exactly one attribute, the id of the thread root it renders. The
/// node never changes after creation; a different thread means a new node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InpageThread {
    id: CommentId,
}

impl InpageThread {
    pub const NAME: &'static str = "thread";
    pub const CLASS: &'static str = "inpage-thread";
    const DOM_ID_PREFIX: &'static str = "inpage-thread-";
    const TEXT_PREFIX: &'static str = "inpage-thread-id-";

    /// Ids must be non-empty and free of whitespace so every textual form parses back
    pub fn new(id: impl Into<CommentId>) -> AnchorResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(AnchorError::invalid_id(&id, "id must not be empty"));
        }
        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AnchorError::invalid_id(&id, "id must not contain whitespace"));
        }
        Ok(Self { id })
    }

    /// Anchor for a brand new thread
    pub fn generate() -> Self {
        Self {
            id: new_comment_id(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // DOM form

    pub fn dom_id(&self) -> String {
        format!("{}{}", Self::DOM_ID_PREFIX, self.id)
    }

    pub fn from_dom_id(dom_id: &str) -> AnchorResult<Self> {
        Self::new(dom_id.strip_prefix(Self::DOM_ID_PREFIX).unwrap_or(dom_id))
    }

    pub fn to_html(&self) -> String {
        format!(
            r#"<div id="{}" class="{}"></div>"#,
            escape_html(&self.dom_id()),
            Self::CLASS
        )
    }

    pub fn to_plain_text(&self) -> String {
        format!("{}{}", Self::TEXT_PREFIX, self.id)
    }

    // Markdown form

    /// `[id](id)` with markdown punctuation escaped, without surrounding newlines
    pub fn to_markdown(&self) -> String {
        let escaped = escape_markdown(&self.id);
        format!("[{}]({})", escaped, escaped)
    }

    /// Append the token to a markdown buffer on a line of its own
    pub fn write_markdown(&self, out: &mut String) {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.to_markdown());
        out.push('\n');
    }

    pub fn from_markdown(markdown: &str) -> AnchorResult<Self> {
        let mut anchors = Self::parse_all(markdown);
        match anchors.len() {
            1 => Ok(anchors.remove(0)),
            0 => Err(AnchorError::InvalidMarkdown(format!(
                "no thread anchor in {:?}",
                markdown
            ))),
            n => Err(AnchorError::InvalidMarkdown(format!(
                "expected one thread anchor, found {}",
                n
            ))),
        }
    }

    /// Every anchor token in a markdown document, in document order
    ///
    /// A token is an inline link alone on its line whose text equals its
    /// destination. Ordinary links are left alone.
    pub fn parse_all(markdown: &str) -> Vec<Self> {
        let mut anchors = Vec::new();
        let mut link: Option<(String, String)> = None;
        let mut candidate: Option<String> = None;
        let mut line_items = 0usize;

        let mut end_line = |candidate: &mut Option<String>, line_items: &mut usize| {
            if *line_items == 1 {
                if let Some(anchor) = candidate.take().and_then(|id| Self::new(id).ok()) {
                    anchors.push(anchor);
                }
            }
            *candidate = None;
            *line_items = 0;
        };

        for event in Parser::new(markdown) {
            match event {
                Event::Start(Tag::Paragraph) => {
                    line_items = 0;
                    candidate = None;
                }
                Event::Start(Tag::Link {
                    link_type: LinkType::Inline,
                    dest_url,
                    ..
                }) => {
                    line_items += 1;
                    link = Some((dest_url.to_string(), String::new()));
                }
                Event::Text(text) | Event::Code(text) => match link.as_mut() {
                    Some((_, label)) => label.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => line_items += 1,
                },
                Event::End(TagEnd::Link) => {
                    if let Some((dest, label)) = link.take() {
                        if dest == label {
                            candidate = Some(dest);
                        }
                    }
                }
                Event::SoftBreak | Event::HardBreak | Event::End(TagEnd::Paragraph) => {
                    if link.is_none() {
                        end_line(&mut candidate, &mut line_items);
                    }
                }
                _ => {
                    if link.is_none() {
                        line_items += 1;
                    }
                }
            }
        }

        anchors
    }

    // Document content form

    pub fn to_content(&self) -> Value {
        json!({
            "type": Self::NAME,
            "attrs": { "id": self.id },
        })
    }

    pub fn from_content(value: &Value) -> AnchorResult<Self> {
        if value.get("type").and_then(Value::as_str) != Some(Self::NAME) {
            return Err(AnchorError::InvalidContent(format!(
                "expected a {} node",
                Self::NAME
            )));
        }
        let id = value
            .pointer("/attrs/id")
            .and_then(Value::as_str)
            .ok_or_else(|| AnchorError::InvalidContent("thread node without id".to_string()))?;
        Self::new(id)
    }

    /// Anchors found anywhere in a content tree
    pub fn find_in_content(value: &Value) -> Vec<Self> {
        let mut anchors = Vec::new();
        collect_anchors(value, &mut anchors);
        anchors
    }

    /// Insert this anchor as a block at `position` of a document's top level
    ///
    /// Positions past the end append.
    pub fn insert_at(&self, document: &mut Value, position: usize) -> AnchorResult<()> {
        let blocks = document
            .get_mut("content")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| {
                AnchorError::InvalidContent("document has no content array".to_string())
            })?;

        let position = position.min(blocks.len());
        blocks.insert(position, self.to_content());
        Ok(())
    }
}

fn collect_anchors(value: &Value, anchors: &mut Vec<InpageThread>) {
    match value {
        Value::Array(nodes) => nodes.iter().for_each(|n| collect_anchors(n, anchors)),
        Value::Object(node) => {
            if let Ok(anchor) = InpageThread::from_content(value) {
                anchors.push(anchor);
                return;
            }
            if let Some(children) = node.get("content") {
                collect_anchors(children, anchors);
            }
        }
        _ => {}
    }
}

fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_punctuation() {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders an anchor; supplied when the node extension is built
pub trait NodeComponent: Send + Sync {
    type Output;

    fn render(&self, node: &InpageThread) -> Self::Output;
}

impl<F, O> NodeComponent for F
where
    F: Fn(&InpageThread) -> O + Send + Sync,
{
    type Output = O;

    fn render(&self, node: &InpageThread) -> O {
        self(node)
    }
}

/// Editor extension for the `thread` node with its component injected
pub struct InpageThreadNode<C> {
    component: C,
}

impl<C: NodeComponent> InpageThreadNode<C> {
    pub fn new(component: C) -> Self {
        Self { component }
    }

    pub fn name(&self) -> &'static str {
        InpageThread::NAME
    }

    pub fn render(&self, node: &InpageThread) -> C::Output {
        self.component.render(node)
    }

    /// Insert command: places a fresh anchor at `position` and returns it
    pub fn insert(&self, document: &mut Value, position: usize) -> AnchorResult<InpageThread> {
        let anchor = InpageThread::generate();
        anchor.insert_at(document, position)?;
        Ok(anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(id: &str) -> InpageThread {
        InpageThread::new(id).expect("valid anchor id")
    }

    #[test]
    fn test_rejects_blank_ids() {
        assert!(InpageThread::new("").is_err());
        assert!(InpageThread::new("two words").is_err());
        assert!(!InpageThread::generate().id().is_empty());
    }

    #[test]
    fn test_dom_and_text_forms() {
        let node = anchor("abc");
        assert_eq!(node.dom_id(), "inpage-thread-abc");
        assert_eq!(node.to_plain_text(), "inpage-thread-id-abc");
        assert_eq!(
            node.to_html(),
            r#"<div id="inpage-thread-abc" class="inpage-thread"></div>"#
        );
        assert_eq!(InpageThread::from_dom_id("inpage-thread-abc").unwrap(), node);
    }

    #[test]
    fn test_markdown_token() {
        let node = anchor("3f2a-91");
        assert_eq!(node.to_markdown(), r"[3f2a\-91](3f2a\-91)");
        assert_eq!(InpageThread::from_markdown(&node.to_markdown()).unwrap(), node);
    }

    #[test]
    fn test_markdown_escapes_punctuation() {
        for id in ["a]b", "x(y)z", "under_score*", r"back\slash", "[x](y)"] {
            let node = anchor(id);
            let parsed = InpageThread::from_markdown(&node.to_markdown())
                .unwrap_or_else(|e| panic!("{} should parse back: {}", id, e));
            assert_eq!(parsed.id(), id);
        }
    }

    #[test]
    fn test_write_markdown_starts_new_line() {
        let mut out = String::from("Some text");
        anchor("t1").write_markdown(&mut out);
        assert_eq!(out, "Some text\n[t1](t1)\n");
    }

    #[test]
    fn test_parse_all_ignores_ordinary_links() {
        let markdown = "\
# Heading

See [the docs](https://example.com) for details.

[t1](t1)

[label](elsewhere)

Inline [t2](t2) inside a sentence.
[t3](t3)
";
        let ids: Vec<String> = InpageThread::parse_all(markdown)
            .into_iter()
            .map(|a| a.id().to_string())
            .collect();
        assert_eq!(ids, vec!["t1", "t3"]);
        assert!(InpageThread::from_markdown(markdown).is_err());
    }

    #[test]
    fn test_content_form() {
        let node = anchor("t1");
        let content = node.to_content();
        assert_eq!(content, json!({"type": "thread", "attrs": {"id": "t1"}}));
        assert_eq!(InpageThread::from_content(&content).unwrap(), node);
        assert!(InpageThread::from_content(&json!({"type": "paragraph"})).is_err());
        assert!(InpageThread::from_content(&json!({"type": "thread", "attrs": {}})).is_err());
    }

    #[test]
    fn test_insert_at_and_find() {
        let mut doc = json!({"type": "doc", "content": [{"type": "paragraph"}]});
        anchor("t1").insert_at(&mut doc, 0).unwrap();
        anchor("t2").insert_at(&mut doc, 99).unwrap();

        let blocks = doc["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["attrs"]["id"], "t1");
        assert_eq!(blocks[2]["attrs"]["id"], "t2");
        assert_eq!(InpageThread::find_in_content(&doc).len(), 2);

        assert!(anchor("t3").insert_at(&mut json!("text"), 0).is_err());
    }

    #[test]
    fn test_node_extension_uses_injected_component() {
        let extension = InpageThreadNode::new(|node: &InpageThread| format!("render {}", node.id()));
        assert_eq!(extension.name(), "thread");
        assert_eq!(extension.render(&anchor("t1")), "render t1");

        let mut doc = json!({"type": "doc", "content": []});
        let inserted = extension.insert(&mut doc, 0).unwrap();
        assert_eq!(InpageThread::find_in_content(&doc), vec![inserted]);
    }
}
