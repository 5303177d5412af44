use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

pub const SEPARATOR_LINE: &str = "# =============";
pub const DEPENDENCIES_HEADING: &str = "# Dependencies";
pub const END_HEADING: &str = "# End";

static DEPENDENCIES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]*Dependencies[ \t]*\r?$").expect("valid regex"));
static END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]*End[ \t]*\r?$").expect("valid regex"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+\S").expect("valid regex"));

/// One `[[...]]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wikilink {
    /// Target title, trimmed, without section or alias.
    pub target: String,
    pub section: Option<String>,
    pub alias: Option<String>,
    pub embed: bool,
    /// 1-based line number.
    pub line: u32,
    /// Byte range of the whole `[[...]]`.
    pub span: Range<usize>,
    /// Byte range of the trimmed target title.
    pub target_span: Range<usize>,
}

/// Every wikilink in `text`, in document order.
pub fn wikilinks(text: &str) -> Vec<Wikilink> {
    let mut out = Vec::new();
    let mut line_start = 0usize;
    for (ix, line) in text.split_inclusive('\n').enumerate() {
        scan_line(line, line_start, (ix + 1) as u32, &mut out);
        line_start += line.len();
    }
    out
}

fn scan_line(line: &str, offset: usize, line_no: u32, out: &mut Vec<Wikilink>) {
    let bytes = line.as_bytes();
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] != b'[' || bytes[i + 1] != b'[' {
            i += 1;
            continue;
        }

        let mut close = None;
        let mut j = i + 2;
        while j + 1 < bytes.len() {
            if bytes[j] == b']' && bytes[j + 1] == b']' {
                close = Some(j);
                break;
            }
            j += 1;
        }
        let Some(j) = close else {
            break;
        };

        let inner = &line[i + 2..j];
        // `[[a [[b]]`: only the innermost opener forms a link.
        if let Some(k) = inner.rfind("[[") {
            i = i + 2 + k;
            continue;
        }

        if let Some((target_range, section, alias)) = split_inner(inner) {
            let inner_start = offset + i + 2;
            out.push(Wikilink {
                target: inner[target_range.clone()].to_string(),
                section,
                alias,
                embed: i > 0 && bytes[i - 1] == b'!',
                line: line_no,
                span: offset + i..offset + j + 2,
                target_span: inner_start + target_range.start..inner_start + target_range.end,
            });
        }
        i = j + 2;
    }
}

fn split_inner(inner: &str) -> Option<(Range<usize>, Option<String>, Option<String>)> {
    let cut = inner.find(['#', '|', '^']).unwrap_or(inner.len());
    let target_raw = &inner[..cut];
    let target = target_raw.trim();
    if target.is_empty() {
        return None;
    }
    let lead = target_raw.len() - target_raw.trim_start().len();

    let rest = &inner[cut..];
    let (before_alias, alias) = match rest.split_once('|') {
        Some((left, right)) => (left, Some(right.trim().to_string()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };
    let section = if let Some(h) = before_alias.strip_prefix('#') {
        Some(h.trim().to_string())
    } else if before_alias.starts_with('^') {
        Some(before_alias.trim().to_string())
    } else {
        None
    }
    .filter(|s| !s.is_empty());

    Some((lead..lead + target.len(), section, alias))
}

/// Distinct wikilink targets of `text`.
pub fn extract_links(text: &str) -> BTreeSet<String> {
    wikilinks(text).into_iter().map(|l| l.target).collect()
}

/// Byte range of the Dependencies section's content: from the end of its
/// heading line up to the next heading (or end of text).
pub fn dependencies_section(text: &str) -> Option<Range<usize>> {
    let heading = DEPENDENCIES_RE.find(text)?;
    let start = heading.end();
    let end = HEADING_RE
        .find_at(text, start)
        .map(|m| m.start())
        .unwrap_or(text.len());
    Some(start..end.max(start))
}

/// Wikilink targets listed in the Dependencies section, in document order.
pub fn dependencies(text: &str) -> Vec<String> {
    let Some(range) = dependencies_section(text) else {
        return Vec::new();
    };
    let mut seen = BTreeSet::new();
    wikilinks(&text[range])
        .into_iter()
        .map(|l| l.target)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

pub fn has_separator(text: &str) -> bool {
    separator_line_start(text).is_some()
}

pub fn has_dependencies_heading(text: &str) -> bool {
    DEPENDENCIES_RE.is_match(text)
}

pub fn has_end_heading(text: &str) -> bool {
    END_RE.is_match(text)
}

pub(crate) fn separator_line_start(text: &str) -> Option<usize> {
    let mut pos = 0usize;
    for line in text.split_inclusive('\n') {
        if line.trim() == SEPARATOR_LINE {
            return Some(pos);
        }
        pos += line.len();
    }
    None
}

pub(crate) fn dependencies_heading_start(text: &str) -> Option<usize> {
    DEPENDENCIES_RE.find(text).map(|m| m.start())
}

pub(crate) fn dependencies_heading_end(text: &str) -> Option<usize> {
    DEPENDENCIES_RE
        .find(text)
        .map(|m| m.end() - usize::from(m.as_str().ends_with('\r')))
}

pub(crate) fn end_heading_start(text: &str) -> Option<usize> {
    END_RE.find(text).map(|m| m.start())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wikilink_alias_and_heading_are_stripped() {
        let links = extract_links("See [[Target|Alias]] and [[Other#Section]] and [[Target]].");
        let links: Vec<_> = links.iter().map(String::as_str).collect();
        assert_eq!(links, vec!["Other", "Target"]);
    }

    #[test]
    fn wikilink_parts_and_spans_are_recorded() {
        let text = "x\nA ![[ Note #Part|Shown ]] [[Blk^id]]\n";
        let links = wikilinks(text);
        assert_eq!(links.len(), 2);

        let first = &links[0];
        assert_eq!(first.target, "Note");
        assert_eq!(first.section.as_deref(), Some("Part"));
        assert_eq!(first.alias.as_deref(), Some("Shown"));
        assert!(first.embed);
        assert_eq!(first.line, 2);
        assert_eq!(&text[first.span.clone()], "[[ Note #Part|Shown ]]");
        assert_eq!(&text[first.target_span.clone()], "Note");

        let second = &links[1];
        assert_eq!(second.target, "Blk");
        assert_eq!(second.section.as_deref(), Some("^id"));
        assert!(!second.embed);
    }

    #[test]
    fn empty_unclosed_and_nested_links_are_handled() {
        assert!(wikilinks("[[]] [[#Only heading]] [[unclosed").is_empty());
        let links = wikilinks("[[a [[b]] c]]");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "b");
    }

    #[test]
    fn dependencies_keep_document_order_until_next_heading() {
        let body = "Intro [[Ignored]]\n\n# =============\n\n# Dependencies\n- [[Zeta]]\n- [[Alpha|A]]\n- [[Zeta]]\n\n# End\n[[After]]\n";
        assert_eq!(dependencies(body), vec!["Zeta".to_string(), "Alpha".to_string()]);
    }

    #[test]
    fn dependencies_without_heading_are_empty() {
        assert!(dependencies("- [[A]]\n").is_empty());
        assert_eq!(dependencies("#Dependencies\n- [[A]]"), vec!["A".to_string()]);
    }

    #[test]
    fn sentinel_detection_is_line_based() {
        let body = "a\n# =============\n#  Dependencies \n# End\n";
        assert!(has_separator(body));
        assert!(has_dependencies_heading(body));
        assert!(has_end_heading(body));
        assert!(!has_end_heading("# Endless\n"));
        assert!(!has_separator("text # ============= inline\n"));
    }
}
