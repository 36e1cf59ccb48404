//! HTML chapter page -> Markdown fragment.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::ExtractionError;
use crate::formats::{Fragment, canonical_url};
use crate::markdown::normalize_blank_lines;

const SKIPPED_ELEMENTS: &[&str] = &[
    "nav", "aside", "header", "footer", "script", "style", "noscript", "template", "svg", "iframe",
    "form", "button", "select", "input", "textarea",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "figure", "figcaption", "details", "summary", "dl",
    "dt", "dd",
];

static H1: Lazy<Selector> = Lazy::new(|| parse_static_selector("h1"));
static TITLE: Lazy<Selector> = Lazy::new(|| parse_static_selector("title"));
static TABLE_ROW: Lazy<Selector> = Lazy::new(|| parse_static_selector("tr"));
static CODE_LINE: Lazy<Selector> = Lazy::new(|| parse_static_selector(".ec-line"));
static CODE: Lazy<Selector> = Lazy::new(|| parse_static_selector("code"));

fn parse_static_selector(selector: &str) -> Selector {
    Selector::parse(selector)
        .unwrap_or_else(|err| panic!("invalid built-in selector {selector:?}: {err}"))
}

pub fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|err| ExtractionError::InvalidSelector {
        selector: selector.to_owned(),
        reason: err.to_string(),
    })
}

/// Maps chapter URLs to their anchors so cross-chapter links stay inside
/// the combined document.
#[derive(Debug, Default, Clone)]
pub struct ChapterLinks {
    anchors: HashMap<String, String>,
}

impl ChapterLinks {
    pub fn insert(&mut self, url: &Url, anchor: impl Into<String>) {
        self.anchors.insert(canonical_url(url), anchor.into());
    }

    pub fn anchor_for(&self, url: &Url) -> Option<&str> {
        self.anchors.get(&canonical_url(url)).map(String::as_str)
    }
}

pub struct Extractor {
    containers: Vec<(String, Selector)>,
}

impl Extractor {
    /// `selectors` are tried in order; the first match is the content root.
    pub fn new<S: AsRef<str>>(selectors: &[S]) -> Result<Self, ExtractionError> {
        let containers = selectors
            .iter()
            .map(|s| Ok((s.as_ref().to_owned(), parse_selector(s.as_ref())?)))
            .collect::<Result<Vec<_>, ExtractionError>>()?;
        Ok(Self { containers })
    }

    pub fn extract(
        &self,
        html: &str,
        page_url: &Url,
        links: &ChapterLinks,
    ) -> Result<Fragment, ExtractionError> {
        let document = Html::parse_document(html);
        let container = self
            .containers
            .iter()
            .find_map(|(_, selector)| document.select(selector).next())
            .ok_or_else(|| ExtractionError::MissingContainer {
                selectors: self
                    .containers
                    .iter()
                    .map(|(raw, _)| raw.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        let title = container
            .select(&H1)
            .next()
            .or_else(|| document.select(&TITLE).next())
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        let converter = Converter { page_url, links };
        let markdown = converter.children(container, Ctx::default());
        let markdown = normalize_blank_lines(&markdown).trim().to_owned();
        if markdown.is_empty() {
            return Err(ExtractionError::EmptyContent);
        }

        Ok(Fragment { title, markdown })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    in_table: bool,
}

struct Converter<'a> {
    page_url: &'a Url,
    links: &'a ChapterLinks,
}

impl Converter<'_> {
    fn children(&self, el: ElementRef<'_>, ctx: Ctx) -> String {
        let mut out = String::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => push_collapsed(&mut out, text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        out.push_str(&self.element(child, ctx));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn element(&self, el: ElementRef<'_>, ctx: Ctx) -> String {
        if is_boilerplate(el) {
            return String::new();
        }

        let name = el.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(name.as_bytes()[1] - b'0');
                let text = collapse_whitespace(&self.children(el, ctx));
                if text.is_empty() {
                    return String::new();
                }
                if ctx.in_table {
                    return format!(" {text} ");
                }
                format!("\n\n{} {text}\n\n", "#".repeat(level))
            }
            "ul" | "ol" if !ctx.in_table => self.list(el, name == "ol", ctx),
            "pre" if !ctx.in_table => self.code_block(el),
            "code" | "pre" => inline_code(&el.text().collect::<String>()),
            "a" => self.link(el, ctx),
            "strong" | "b" => wrap_inline(&self.children(el, ctx), "**"),
            "em" | "i" => wrap_inline(&self.children(el, ctx), "*"),
            "img" => self.image(el),
            "br" if ctx.in_table => " ".to_owned(),
            "br" => "  \n".to_owned(),
            "hr" if ctx.in_table => String::new(),
            "hr" => "\n\n---\n\n".to_owned(),
            "blockquote" if !ctx.in_table => {
                let body = normalize_blank_lines(&self.children(el, ctx));
                let quoted = body
                    .trim()
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            ">".to_owned()
                        } else {
                            format!("> {line}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                block(&quoted)
            }
            "table" if !ctx.in_table => self.table(el),
            _ if BLOCK_ELEMENTS.contains(&name) || name == "blockquote" || name == "li" => {
                let content = self.children(el, ctx);
                if ctx.in_table {
                    format!(" {} ", collapse_whitespace(&content))
                } else {
                    block(content.trim())
                }
            }
            _ => self.children(el, ctx),
        }
    }

    fn list(&self, el: ElementRef<'_>, ordered: bool, ctx: Ctx) -> String {
        let mut number = el
            .value()
            .attr("start")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1);

        let mut out = String::from("\n\n");
        for item in el.children().filter_map(ElementRef::wrap) {
            if item.value().name() != "li" {
                continue;
            }
            let marker = if ordered {
                format!("{number}. ")
            } else {
                "- ".to_owned()
            };
            number += 1;

            let body = normalize_blank_lines(&self.children(item, ctx));
            let mut lines = body.trim().lines();
            out.push_str(&marker);
            out.push_str(lines.next().unwrap_or_default());
            out.push('\n');

            let pad = " ".repeat(marker.len());
            for line in lines {
                if !line.is_empty() {
                    out.push_str(&pad);
                    out.push_str(line);
                }
                out.push('\n');
            }
        }
        out.push('\n');
        out
    }

    fn code_block(&self, el: ElementRef<'_>) -> String {
        let lines: Vec<String> = el
            .select(&CODE_LINE)
            .map(|line| line.text().collect::<String>())
            .collect();
        let code = if lines.is_empty() {
            el.text().collect::<String>()
        } else {
            lines.join("\n")
        };
        let code = code.strip_prefix('\n').unwrap_or(&code).trim_end();

        let fence = "`".repeat(longest_run(code, '`').max(2) + 1);
        let lang = code_language(el).unwrap_or_default();
        format!("\n\n{fence}{lang}\n{code}\n{fence}\n\n")
    }

    fn link(&self, el: ElementRef<'_>, ctx: Ctx) -> String {
        let content = self.children(el, ctx);
        let text = content.trim();
        let Some(href) = el
            .value()
            .attr("href")
            .map(str::trim)
            .filter(|href| !href.is_empty() && !href.starts_with("javascript:"))
        else {
            return content;
        };

        let is_heading_anchor = el
            .value()
            .classes()
            .any(|class| class.contains("anchor") || class == "headerlink");
        if text.is_empty() || (is_heading_anchor && href.starts_with('#')) {
            return String::new();
        }

        format!("[{text}]({})", self.link_target(href))
    }

    fn link_target(&self, href: &str) -> String {
        if href.starts_with('#') {
            return href.to_owned();
        }
        let Ok(resolved) = self.page_url.join(href) else {
            return href.to_owned();
        };
        match self.links.anchor_for(&resolved) {
            Some(anchor) => match resolved.fragment().filter(|f| !f.is_empty()) {
                Some(fragment) => format!("#{fragment}"),
                None => format!("#{anchor}"),
            },
            None => markdown_url(resolved.as_str()),
        }
    }

    fn image(&self, el: ElementRef<'_>) -> String {
        let Some(src) = el
            .value()
            .attr("src")
            .or_else(|| el.value().attr("data-src"))
            .map(str::trim)
            .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        else {
            return String::new();
        };
        let alt = collapse_whitespace(el.value().attr("alt").unwrap_or_default())
            .replace(['[', ']'], "");
        let target = match self.page_url.join(src) {
            Ok(url) => url.to_string(),
            Err(_) => src.to_owned(),
        };
        format!("![{alt}]({})", markdown_url(&target))
    }

    fn table(&self, el: ElementRef<'_>) -> String {
        let cell_ctx = Ctx { in_table: true };
        let rows: Vec<Vec<String>> = el
            .select(&TABLE_ROW)
            .map(|row| {
                row.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| matches!(cell.value().name(), "th" | "td"))
                    .map(|cell| {
                        collapse_whitespace(&self.children(cell, cell_ctx)).replace('|', "\\|")
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|cells| !cells.is_empty())
            .collect();

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return String::new();
        }

        let render_row = |cells: &[String]| {
            let mut line = String::from("|");
            for idx in 0..width {
                line.push(' ');
                line.push_str(cells.get(idx).map(String::as_str).unwrap_or_default());
                line.push_str(" |");
            }
            line
        };

        let mut lines = vec![render_row(&rows[0])];
        lines.push(format!("|{}", " --- |".repeat(width)));
        lines.extend(rows[1..].iter().map(|row| render_row(row)));
        block(&lines.join("\n"))
    }
}

fn is_boilerplate(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if SKIPPED_ELEMENTS.contains(&value.name()) {
        return true;
    }
    if value.attr("aria-hidden") == Some("true") || value.attr("hidden").is_some() {
        return true;
    }
    if value.classes().any(|class| class == "breadcrumb") {
        return true;
    }
    // "On this page" side tables of contents.
    el.children().filter_map(ElementRef::wrap).any(|child| {
        child.value().name() == "h2"
            && collapse_whitespace(&child.text().collect::<String>()).starts_with("On this page")
    })
}

fn code_language(pre: ElementRef<'_>) -> Option<String> {
    if let Some(lang) = pre.value().attr("data-language") {
        return Some(lang.trim().to_owned()).filter(|l| !l.is_empty());
    }
    std::iter::once(pre)
        .chain(pre.select(&CODE))
        .flat_map(|el| el.value().classes())
        .find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
        })
        .map(str::to_owned)
}

fn block(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    format!("\n\n{content}\n\n")
}

fn inline_code(code: &str) -> String {
    if code.is_empty() {
        return String::new();
    }
    let ticks = "`".repeat(longest_run(code, '`') + 1);
    if code.starts_with('`') || code.ends_with('`') {
        format!("{ticks} {code} {ticks}")
    } else {
        format!("{ticks}{code}{ticks}")
    }
}

/// Emphasis markers hug the text; surrounding spaces stay outside.
fn wrap_inline(content: &str, marker: &str) -> String {
    let inner = content.trim();
    if inner.is_empty() {
        return content.to_owned();
    }
    let lead = if content.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if content.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{lead}{marker}{inner}{marker}{trail}")
}

fn markdown_url(url: &str) -> String {
    if url.contains(['(', ')', ' ']) {
        format!("<{url}>")
    } else {
        url.to_owned()
    }
}

fn longest_run(text: &str, ch: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn push_collapsed(out: &mut String, text: &str) {
    let mut last_was_space = out.ends_with(' ');
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONTENT_SELECTORS;

    fn page_url() -> Url {
        Url::parse("https://www.tradingview.com/pine-script-docs/language/arrays/").unwrap()
    }

    fn extract(html: &str) -> Result<Fragment, ExtractionError> {
        let mut links = ChapterLinks::default();
        links.insert(
            &Url::parse("https://www.tradingview.com/pine-script-docs/language/maps/").unwrap(),
            "maps",
        );
        Extractor::new(DEFAULT_CONTENT_SELECTORS)?.extract(html, &page_url(), &links)
    }

    #[test]
    fn converts_structural_elements_in_order() -> anyhow::Result<()> {
        let html = r#"<!doctype html>
<html><head><title>Arrays / Pine Script</title></head>
<body>
  <nav><a href="/">Home</a></nav>
  <main>
    <div class="breadcrumb"><a href="/docs">Docs</a> / Arrays</div>
    <h1>Arrays</h1>
    <p>Arrays are <strong>one-dimensional</strong> and <em>dynamic</em>.</p>
    <ul>
      <li>First <code>array.new&lt;int&gt;()</code></li>
      <li>Second
        <ol><li>Nested</li></ol>
      </li>
    </ul>
    <pre><code class="language-pine">a = array.new&lt;float&gt;()

plot(a.size())
</code></pre>
    <p><img src="/static/images/Arrays-1.webp" alt="Chart"></p>
    <script>console.log("x")</script>
  </main>
  <footer>Legal</footer>
</body></html>"#;

        let fragment = extract(html)?;
        assert_eq!(fragment.title.as_deref(), Some("Arrays"));
        assert_eq!(
            fragment.markdown,
            "# Arrays\n\n\
Arrays are **one-dimensional** and *dynamic*.\n\n\
- First `array.new<int>()`\n\
- Second\n\n  1. Nested\n\n\
```pine\na = array.new<float>()\n\nplot(a.size())\n```\n\n\
![Chart](https://www.tradingview.com/static/images/Arrays-1.webp)"
        );
        Ok(())
    }

    #[test]
    fn missing_container_is_an_error() {
        let html = "<html><body><div>No main element</div></body></html>";
        let err = extract(html).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingContainer { .. }));
    }

    #[test]
    fn empty_container_is_an_error() {
        let html = "<html><body><main><nav>only nav</nav></main></body></html>";
        let err = extract(html).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyContent));
    }

    #[test]
    fn links_to_other_chapters_become_anchors() -> anyhow::Result<()> {
        let html = r##"<html><body><main>
<p>See <a href="../maps/">maps</a>, <a href="../maps/#keys">keys</a>,
<a href="https://example.com/x">elsewhere</a> and <a href="#top">top</a>.</p>
</main></body></html>"##;
        let fragment = extract(html)?;
        assert_eq!(
            fragment.markdown,
            "See [maps](#maps), [keys](#keys), [elsewhere](https://example.com/x) and [top](#top)."
        );
        Ok(())
    }

    #[test]
    fn on_this_page_block_is_dropped() -> anyhow::Result<()> {
        let html = r#"<html><body><main>
<div class="toc"><h2>On this page</h2><ul><li>Intro</li></ul></div>
<h2>Intro</h2><p>Body</p>
</main></body></html>"#;
        let fragment = extract(html)?;
        assert_eq!(fragment.markdown, "## Intro\n\nBody");
        Ok(())
    }

    #[test]
    fn tables_render_as_pipe_tables() -> anyhow::Result<()> {
        let html = r#"<html><body><article><table>
<thead><tr><th>Name</th><th>Type</th></tr></thead>
<tbody><tr><td>a|b</td><td><code>int</code></td></tr></tbody>
</table></article></body></html>"#;
        let fragment = extract(html)?;
        assert_eq!(
            fragment.markdown,
            "| Name | Type |\n| --- | --- |\n| a\\|b | `int` |"
        );
        Ok(())
    }

    #[test]
    fn line_wrapped_code_keeps_line_breaks() -> anyhow::Result<()> {
        let html = r#"<html><body><main><pre data-language="pine"><code><div class="ec-line">//@version=6</div><div class="ec-line">plot(close)</div></code></pre></main></body></html>"#;
        let fragment = extract(html)?;
        assert_eq!(fragment.markdown, "```pine\n//@version=6\nplot(close)\n```");
        Ok(())
    }

    #[test]
    fn invalid_selector_is_reported() {
        let err = Extractor::new(&["main["]).err().unwrap();
        assert!(matches!(err, ExtractionError::InvalidSelector { .. }));
    }
}
