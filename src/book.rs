use crate::formats::Section;
use crate::markdown::FenceTracker;

/// Concatenates the table of contents and every section, in the given
/// order, into one Markdown document.
pub fn assemble(toc: &str, sections: &[Section]) -> String {
    let mut bundled = String::new();
    bundled.push_str(toc.trim_end());
    bundled.push_str("\n\n");

    for (idx, section) in sections.iter().enumerate() {
        if idx != 0 {
            bundled.push_str("\n---\n\n");
        }

        bundled.push_str(&format!("<a id=\"{}\"></a>\n\n", section.anchor));
        bundled.push_str(&format!("# {}\n\n", section.title));

        let body = strip_leading_h1(&section.markdown, &section.title).trim();
        if !body.is_empty() {
            bundled.push_str(body);
            bundled.push('\n');
            if let Some(fence) = unclosed_fence(body) {
                tracing::warn!(
                    anchor = %section.anchor,
                    "chapter ends inside a code block; closing it"
                );
                bundled.push_str(&fence);
                bundled.push('\n');
            }
        }
    }

    bundled
}

/// Moves each `<a id="slug"></a>` chapter anchor onto the heading that
/// follows it as a `{#slug}` attribute. PDF writers drop raw HTML, so this is
/// what keeps TOC links resolvable there. Anchors not followed by a heading
/// and anything inside code blocks are left alone.
pub fn heading_ids_from_anchors(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut fences = FenceTracker::default();
    let mut pending: Option<(&str, String)> = None;

    for line in markdown.lines() {
        if let Some((id, held)) = pending.take() {
            if line.trim().is_empty() {
                pending = Some((id, held + line + "\n"));
                continue;
            }
            if is_atx_heading(line) {
                out.push_str(&format!("{} {{#{id}}}\n", line.trim_end()));
                continue;
            }
            out.push_str(&format!("<a id=\"{id}\"></a>\n"));
            out.push_str(&held);
        }

        let in_code = fences.consume(line);
        if !in_code && let Some(id) = anchor_id(line) {
            pending = Some((id, String::new()));
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    if let Some((id, held)) = pending {
        out.push_str(&format!("<a id=\"{id}\"></a>\n"));
        out.push_str(&held);
    }
    out
}

fn anchor_id(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("<a id=\"")?
        .strip_suffix("\"></a>")
        .filter(|id| !id.is_empty() && !id.contains('"'))
}

fn is_atx_heading(line: &str) -> bool {
    let level = line.bytes().take_while(|b| *b == b'#').count();
    (1..=6).contains(&level) && line[level..].starts_with(' ')
}

fn unclosed_fence(markdown: &str) -> Option<String> {
    let mut fences = FenceTracker::default();
    for line in markdown.lines() {
        fences.consume(line);
    }
    fences.closing_fence()
}

/// Drops a leading `# ` heading that repeats the chapter title.
fn strip_leading_h1<'a>(body: &'a str, title: &str) -> &'a str {
    let body = body.trim_start_matches('\n');
    let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
    match first.strip_prefix("# ") {
        Some(heading) if heading.trim().eq_ignore_ascii_case(title.trim()) => rest,
        _ => body,
    }
}
