//! Line-level helpers for Markdown produced by this crate.

/// Tracks whether a line sits inside a fenced code block.
#[derive(Debug, Default)]
pub struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    /// Feeds one line and reports whether it belongs to a code block
    /// (fence lines included).
    pub fn consume(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let Some((ch, len)) = fence_marker(trimmed) else {
            return self.open.is_some();
        };

        match self.open {
            None => {
                self.open = Some((ch, len));
            }
            Some((open_ch, open_len)) => {
                let rest = trimmed[len..].trim();
                if ch == open_ch && len >= open_len && rest.is_empty() {
                    self.open = None;
                }
            }
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// The fence that would close the currently open block.
    pub fn closing_fence(&self) -> Option<String> {
        self.open
            .map(|(ch, len)| std::iter::repeat_n(ch, len).collect())
    }
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let ch = line.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = line.chars().take_while(|c| *c == ch).count();
    if len < 3 {
        return None;
    }
    if ch == '`' && line[len..].contains('`') {
        return None;
    }
    Some((ch, len))
}

/// Collapses runs of blank lines to one, trims trailing whitespace, and
/// leaves fenced code untouched.
pub fn normalize_blank_lines(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    let mut fences = FenceTracker::default();
    let mut pending_blank = false;

    for line in md.lines() {
        let in_code = fences.consume(line);
        if in_code {
            if pending_blank && !out.is_empty() {
                out.push('\n');
            }
            pending_blank = false;
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let line = line.trim_end();
        if line.is_empty() {
            pending_blank = true;
            continue;
        }
        if pending_blank && !out.is_empty() {
            out.push('\n');
        }
        pending_blank = false;
        out.push_str(line);
        out.push('\n');
    }

    out
}
