//! HTML pretty-printing
//!
//! Rendered pages are re-indented from their token stream: every element
//! starts on its own line, two spaces deeper than its parent. An element
//! holding nothing but text stays on one line. The contents of `pre`,
//! `textarea`, `script` and `style` are written back verbatim.

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
};

const INDENT: &str = "  ";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose contents are never re-indented
const VERBATIM_ELEMENTS: &[&str] = &["pre", "textarea", "script", "style"];

#[derive(Debug)]
enum Node {
    Open {
        name: String,
        html: String,
        void: bool,
    },
    Close(String),
    /// Serialized text, already escaped where needed
    Text(String),
    Markup(String),
}

#[derive(Default)]
struct Collector {
    nodes: Vec<Node>,
    raw_text: bool,
}

impl Collector {
    fn push_text(&mut self, text: &str) {
        let text = if self.raw_text {
            text.to_string()
        } else {
            escape_text(text)
        };
        match self.nodes.last_mut() {
            Some(Node::Text(last)) => last.push_str(&text),
            _ => self.nodes.push(Node::Text(text)),
        }
    }

    fn push_tag(&mut self, tag: Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();

        if tag.kind == TagKind::EndTag {
            self.raw_text = false;
            self.nodes.push(Node::Close(name));
            return TokenSinkResult::Continue;
        }

        let mut html = format!("<{}", name);
        for attr in &tag.attrs {
            html.push(' ');
            html.push_str(&attr.name.local);
            if !attr.value.is_empty() {
                html.push_str("=\"");
                html.push_str(&escape_attribute(&attr.value));
                html.push('"');
            }
        }
        html.push_str(if tag.self_closing { " />" } else { ">" });

        let raw = match name.as_str() {
            _ if tag.self_closing => None,
            "script" => Some(RawKind::ScriptData),
            "style" => Some(RawKind::Rawtext),
            "textarea" | "title" => Some(RawKind::Rcdata),
            _ => None,
        };
        self.raw_text = matches!(raw, Some(RawKind::ScriptData | RawKind::Rawtext));

        let void = tag.self_closing || VOID_ELEMENTS.contains(&name.as_str());
        self.nodes.push(Node::Open { name, html, void });

        match raw {
            Some(kind) => TokenSinkResult::RawData(kind),
            None => TokenSinkResult::Continue,
        }
    }
}

impl TokenSink for Collector {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => return self.push_tag(tag),
            Token::CharacterTokens(text) => self.push_text(&text),
            Token::CommentToken(text) => self.nodes.push(Node::Markup(format!("<!--{}-->", text))),
            Token::DoctypeToken(doctype) => {
                let name = doctype.name.as_deref().unwrap_or("html");
                self.nodes.push(Node::Markup(format!("<!DOCTYPE {}>", name)));
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('"', "&quot;")
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(line);
    out.push('\n');
}

/// Non-empty trimmed lines of a text run
fn text_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Serialize everything up to the element closing `nodes[open]` as is.
/// Returns the contents and the index after the closing tag.
fn verbatim(nodes: &[Node], open: usize, name: &str) -> (String, usize) {
    let mut content = String::new();
    let mut nesting = 0;
    let mut i = open + 1;

    while i < nodes.len() {
        match &nodes[i] {
            Node::Close(close) if close == name && nesting == 0 => return (content, i + 1),
            Node::Close(close) => {
                nesting -= usize::from(close == name && nesting > 0);
                content.push_str(&format!("</{}>", close));
            }
            Node::Open { name: inner, html, .. } => {
                nesting += usize::from(inner == name);
                content.push_str(html);
            }
            Node::Text(text) | Node::Markup(text) => content.push_str(text),
        }
        i += 1;
    }
    (content, i)
}

fn layout(nodes: &[Node]) -> String {
    let mut out = String::new();
    let mut depth = 0;
    let mut i = 0;

    while i < nodes.len() {
        match &nodes[i] {
            Node::Open { html, void: true, .. } => {
                push_line(&mut out, depth, html);
                i += 1;
            }
            Node::Open { name, html, .. } if VERBATIM_ELEMENTS.contains(&name.as_str()) => {
                let (content, next) = verbatim(nodes, i, name);
                push_line(&mut out, depth, &format!("{}{}</{}>", html, content, name));
                i = next;
            }
            Node::Open { name, html, .. } => match (nodes.get(i + 1), nodes.get(i + 2)) {
                (Some(Node::Close(close)), _) if close == name => {
                    push_line(&mut out, depth, &format!("{}</{}>", html, name));
                    i += 2;
                }
                (Some(Node::Text(text)), Some(Node::Close(close))) if close == name => {
                    let text = text_lines(text).collect::<Vec<_>>().join(" ");
                    push_line(&mut out, depth, &format!("{}{}</{}>", html, text, name));
                    i += 3;
                }
                _ => {
                    push_line(&mut out, depth, html);
                    depth += 1;
                    i += 1;
                }
            },
            Node::Close(name) => {
                depth = depth.saturating_sub(1);
                push_line(&mut out, depth, &format!("</{}>", name));
                i += 1;
            }
            Node::Text(text) => {
                for line in text_lines(text) {
                    push_line(&mut out, depth, line);
                }
                i += 1;
            }
            Node::Markup(markup) => {
                push_line(&mut out, depth, markup);
                i += 1;
            }
        }
    }

    out
}

/// Re-indent an HTML document or fragment
pub fn pretty_html(source: &str) -> String {
    let mut input = BufferQueue::default();
    input.push_back(StrTendril::from_slice(source));

    let mut tokenizer = Tokenizer::new(Collector::default(), TokenizerOpts::default());
    let _ = tokenizer.feed(&mut input);
    tokenizer.end();

    layout(&tokenizer.sink.nodes)
}
