//! HTML rendering of a document delta.
//!
//! Block formats (`header`) live on the newline that ends a line; inline
//! formats live on the text itself. Non-insert ops are ignored.

use serde_json::{Map, Value};

use crate::attributes::{is_enabled, Attributes};
use crate::delta::{Delta, Insert, Op};

pub fn to_html(delta: &Delta) -> String {
    let mut out = String::new();
    let mut line = String::new();

    for op in delta.ops() {
        let Op::Insert { content, attributes } = op else {
            continue;
        };
        match content {
            Insert::Embed(embed) => line.push_str(&render_embed(embed)),
            Insert::Text(text) => {
                let mut parts = text.split('\n');
                if let Some(first) = parts.next() {
                    push_inline(&mut line, first, attributes);
                }
                for part in parts {
                    close_block(&mut out, &mut line, attributes);
                    push_inline(&mut line, part, attributes);
                }
            }
        }
    }

    if !line.is_empty() {
        close_block(&mut out, &mut line, &Attributes::new());
    }
    out
}

fn close_block(out: &mut String, line: &mut String, attributes: &Attributes) {
    let tag = match attributes.get("header").and_then(Value::as_u64) {
        Some(level @ 1..=6) => format!("h{level}"),
        _ => "p".to_string(),
    };
    let body = if line.is_empty() { "<br>" } else { line.as_str() };
    out.push_str(&format!("<{tag}>{body}</{tag}>"));
    line.clear();
}

fn push_inline(line: &mut String, text: &str, attributes: &Attributes) {
    if text.is_empty() {
        return;
    }
    let mut html = escape(text);

    let mut style = Vec::new();
    if let Some(color) = attributes.get("color").and_then(Value::as_str) {
        style.push(format!("color: {}", escape(color)));
    }
    if let Some(background) = attributes.get("background").and_then(Value::as_str) {
        style.push(format!("background-color: {}", escape(background)));
    }
    let mut classes = Vec::new();
    if let Some(size) = attributes.get("size").and_then(Value::as_str) {
        classes.push(format!("ql-size-{}", escape(size)));
    }
    if let Some(font) = attributes.get("font").and_then(Value::as_str) {
        classes.push(format!("ql-font-{}", escape(font)));
    }
    if !style.is_empty() || !classes.is_empty() {
        let mut open = String::from("<span");
        if !classes.is_empty() {
            open.push_str(&format!(" class=\"{}\"", classes.join(" ")));
        }
        if !style.is_empty() {
            open.push_str(&format!(" style=\"{};\"", style.join("; ")));
        }
        html = format!("{open}>{html}</span>");
    }

    for (key, tag) in [("strike", "s"), ("underline", "u"), ("italic", "em"), ("bold", "strong")] {
        if is_enabled(attributes, key) {
            html = format!("<{tag}>{html}</{tag}>");
        }
    }
    line.push_str(&html);
}

fn render_embed(embed: &Map<String, Value>) -> String {
    match embed.get("image").and_then(Value::as_str) {
        Some(src) => format!("<img src=\"{}\">", escape(src)),
        None => String::new(),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
