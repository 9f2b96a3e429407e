//! Entry name sanitization and collision handling

use std::collections::HashSet;

const REPLACED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
const FALLBACK_NAME: &str = "file";

/// Make a display name safe to use as a flat archive entry name.
///
/// Control characters are dropped, path-breaking characters become `_`,
/// whitespace runs collapse to one space, leading dots are removed and the
/// result is capped at `max_bytes` while keeping the extension. Applying it
/// twice gives the same result as applying it once.
pub fn sanitize_name(raw: &str, max_bytes: usize) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space && !cleaned.is_empty() {
            cleaned.push(' ');
        }
        pending_space = false;
        cleaned.push(if REPLACED.contains(&c) { '_' } else { c });
    }

    let trimmed = cleaned.trim_start_matches(['.', ' ']);
    let capped = cap_length(trimmed, max_bytes);

    if capped.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        capped
    }
}

fn cap_length(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }

    if let Some(dot) = name.rfind('.') {
        let ext = &name[dot..];
        if dot > 0 && ext.len() < max_bytes / 2 {
            let stem = truncate_at_boundary(&name[..dot], max_bytes - ext.len()).trim_end();
            if !stem.is_empty() {
                return format!("{stem}{ext}");
            }
        }
    }

    truncate_at_boundary(name, max_bytes).trim_end().to_string()
}

/// Longest prefix of `s` that is at most `max_bytes` long and ends on a char boundary
fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Hands out unique, sanitized entry names in call order.
///
/// A repeated name gets `_1`, `_2`, ... inserted before its first dot, so
/// `IMG.jpg` twice becomes `IMG.jpg` and `IMG_1.jpg`.
#[derive(Debug)]
pub struct EntryNamer {
    max_bytes: usize,
    taken: HashSet<String>,
}

impl EntryNamer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            taken: HashSet::new(),
        }
    }

    pub fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_name(raw, self.max_bytes);
        if self.taken.insert(base.clone()) {
            return base;
        }

        let (stem, ext) = match base.find('.') {
            Some(dot) => base.split_at(dot),
            None => (base.as_str(), ""),
        };

        let mut counter = 1u64;
        loop {
            let suffix = format!("_{counter}");
            // The extension gives way once it alone leaves no room for the suffix
            let ext = truncate_at_boundary(ext, self.max_bytes.saturating_sub(suffix.len()));
            let budget = self.max_bytes.saturating_sub(ext.len() + suffix.len());
            let candidate = format!("{}{suffix}{ext}", truncate_at_boundary(stem, budget));
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}
