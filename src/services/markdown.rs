//! Markdown rendering
//!
//! Article bodies are written in Markdown and stored alongside their rendered
//! HTML. Raw HTML in the source is escaped, never passed through.
//!
//! # Example
//!
//! ```
//! use newsdesk::services::markdown::MarkdownRenderer;
//!
//! let renderer = MarkdownRenderer::new();
//! let html = renderer.render("# Headline\n\nThis is **bold** text.");
//! assert!(html.contains("<h1>"));
//! assert!(html.contains("<strong>"));
//! ```

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

/// Markdown to HTML renderer.
///
/// Supports tables, strikethrough, task lists and smart punctuation on top of
/// CommonMark. Fenced code blocks get a `language-*` class.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: Options,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        Self { options }
    }

    /// Render Markdown to HTML
    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options);
        let events = process_events(parser);

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, events.into_iter());
        html_output
    }
}

/// Escape raw HTML and replace code blocks with pre-rendered markup
fn process_events<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut events = Vec::new();
    let mut in_code_block = false;
    let mut code_lang: Option<String> = None;
    let mut code_content = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                code_content.clear();
                code_lang = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => {
                        lang.split_whitespace().next().map(String::from)
                    }
                    _ => None,
                };
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                let block = match code_lang.take() {
                    Some(lang) => format!(
                        "<pre><code class=\"language-{}\">{}</code></pre>\n",
                        html_escape(&lang),
                        html_escape(&code_content)
                    ),
                    None => format!("<pre><code>{}</code></pre>\n", html_escape(&code_content)),
                };
                events.push(Event::Html(block.into()));
            }
            Event::Text(text) if in_code_block => code_content.push_str(&text),
            // Text events are escaped by the HTML writer
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            _ => events.push(event),
        }
    }

    events
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
