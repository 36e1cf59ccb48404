use std::collections::HashSet;

/// Anchor slug for a heading: lower-case, every run of non-alphanumeric
/// characters collapsed to one `-`, no leading or trailing `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("section");
    }
    slug
}

/// Unique anchors for `titles`, in order. A repeated slug gets `-2`, `-3`, ...
pub fn assign_anchors<S: AsRef<str>>(titles: &[S]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut anchors = Vec::with_capacity(titles.len());

    for title in titles {
        let base = slugify(title.as_ref());
        let mut anchor = base.clone();
        let mut n = 2_usize;
        while used.contains(&anchor) {
            anchor = format!("{base}-{n}");
            n += 1;
        }
        used.insert(anchor.clone());
        anchors.push(anchor);
    }

    anchors
}

/// Markdown table of contents linking each `(title, anchor)` entry.
pub fn render_toc<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut md = String::from("# Table of Contents\n\n");
    for (title, anchor) in entries {
        md.push_str(&format!("- [{}](#{anchor})\n", escape_link_text(title)));
    }
    md
}

pub fn build_toc<S: AsRef<str>>(titles: &[S]) -> (String, Vec<String>) {
    let anchors = assign_anchors(titles);
    let toc = render_toc(
        titles
            .iter()
            .map(|title| title.as_ref())
            .zip(anchors.iter().map(String::as_str)),
    );
    (toc, anchors)
}

fn escape_link_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
