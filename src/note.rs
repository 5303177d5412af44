use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::fsutil::{now_timestamp, read_text};
use crate::parse::markdown::{
    dependencies_heading_end, dependencies_heading_start, end_heading_start,
    has_dependencies_heading, has_end_heading, has_separator, separator_line_start,
};
use crate::parse::{
    DEPENDENCIES_HEADING, END_HEADING, Frontmatter, FrontmatterStatus, SEPARATOR_LINE,
    dependencies, extract_links, set_last_updated, split,
};
use crate::{MetadataFormat, Result, Vault};

/// Characters that may never appear in a title.
pub const FORBIDDEN_TITLE_CHARS: &[char] = &['[', ']', ':', '\\', '/', '^', '|', '#', '*', '"', '<', '>'];

/// Replaces forbidden characters with spaces, collapses whitespace and trims
/// surrounding whitespace and dots. Idempotent.
pub fn normalize_title(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if FORBIDDEN_TITLE_CHARS.contains(&c) { ' ' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// Appends the separator, Dependencies heading and End heading when missing,
/// keeping the ones already present and their relative order.
pub fn ensure_footer(body: &str) -> String {
    let mut out = body.to_string();
    if !has_end_heading(&out) {
        push_section(&mut out, END_HEADING);
    }
    if !has_dependencies_heading(&out) {
        let at = end_heading_start(&out).unwrap_or(out.len());
        insert_section(&mut out, at, DEPENDENCIES_HEADING);
    }
    if !has_separator(&out) {
        let at = dependencies_heading_start(&out).unwrap_or(out.len());
        insert_section(&mut out, at, SEPARATOR_LINE);
    }
    out
}

fn push_section(out: &mut String, line: &str) {
    if !out.is_empty() {
        while !out.ends_with("\n\n") {
            out.push('\n');
        }
    }
    out.push_str(line);
    out.push('\n');
}

fn insert_section(out: &mut String, at: usize, line: &str) {
    let mut block = String::new();
    if at > 0 && !out[..at].ends_with('\n') {
        block.push('\n');
    }
    block.push_str(line);
    block.push_str("\n\n");
    out.insert_str(at, &block);
}

/// Full text of a new note: metadata block, trimmed content, footer, and
/// one `- [[Dep]]` bullet per dependency under the Dependencies heading.
pub fn build_new_note(
    frontmatter: &Frontmatter,
    content: &str,
    dependencies: &[String],
) -> Result<String> {
    let mut fm = frontmatter.clone();
    if fm.last_updated.is_none() {
        fm.last_updated = Some(now_timestamp());
    }

    let mut body = content.trim_end().to_string();
    if !body.is_empty() {
        body.push('\n');
    }
    let mut body = ensure_footer(&body);

    let mut seen = BTreeSet::new();
    let bullets: String = dependencies
        .iter()
        .map(|d| normalize_title(d))
        .filter(|d| !d.is_empty() && seen.insert(d.clone()))
        .map(|d| format!("\n- [[{d}]]"))
        .collect();
    if !bullets.is_empty() {
        if let Some(at) = dependencies_heading_end(&body) {
            body.insert_str(at, &bullets);
        }
    }

    Ok(format!("{}{}", fm.render()?, body))
}

/// `raw` with its `last-updated` set to `stamp`; notes without a valid
/// metadata block come back unchanged.
pub fn touch_last_updated(raw: &str, stamp: &str, format: MetadataFormat) -> String {
    set_last_updated(raw, stamp, format).unwrap_or_else(|| raw.to_string())
}

/// Body text before the separator line, without trailing whitespace.
pub fn main_content(body: &str) -> &str {
    let end = separator_line_start(body).unwrap_or(body.len());
    body[..end].trim_end()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingMetadata,
    MalformedMetadata { error: String },
    MissingEnd,
    MissingDependencies,
    MissingSeparator,
    FooterOutOfOrder,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingMetadata => write!(f, "missing metadata block"),
            ValidationIssue::MalformedMetadata { error } => {
                write!(f, "malformed metadata block: {error}")
            }
            ValidationIssue::MissingEnd => write!(f, "missing '{END_HEADING}' sentinel"),
            ValidationIssue::MissingDependencies => {
                write!(f, "missing '{DEPENDENCIES_HEADING}' section")
            }
            ValidationIssue::MissingSeparator => write!(f, "missing '{SEPARATOR_LINE}' separator"),
            ValidationIssue::FooterOutOfOrder => write!(
                f,
                "footer sections out of order (expected separator, dependencies, end)"
            ),
        }
    }
}

impl Serialize for ValidationIssue {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Structural checks of a raw note. Problems are returned, never raised.
pub fn validate(raw: &str, format: MetadataFormat) -> Vec<ValidationIssue> {
    let parsed = split(raw, format);
    let mut issues = Vec::new();
    match &parsed.status {
        FrontmatterStatus::None => issues.push(ValidationIssue::MissingMetadata),
        FrontmatterStatus::Broken { error } => issues.push(ValidationIssue::MalformedMetadata {
            error: error.clone(),
        }),
        FrontmatterStatus::Valid if parsed.frontmatter.is_empty() => {
            issues.push(ValidationIssue::MissingMetadata)
        }
        FrontmatterStatus::Valid => {}
    }

    let body = parsed.body;
    let end = end_heading_start(body);
    let deps = dependencies_heading_start(body);
    let sep = separator_line_start(body);
    if end.is_none() {
        issues.push(ValidationIssue::MissingEnd);
    }
    if deps.is_none() {
        issues.push(ValidationIssue::MissingDependencies);
    }
    if sep.is_none() {
        issues.push(ValidationIssue::MissingSeparator);
    }
    if let (Some(sep), Some(deps), Some(end)) = (sep, deps, end) {
        if !(sep < deps && deps < end) {
            issues.push(ValidationIssue::FooterOutOfOrder);
        }
    }
    issues
}

/// A note as returned by a read.
#[derive(Debug, Clone, Serialize)]
pub struct NoteDocument {
    pub path: String,
    pub title: String,
    pub frontmatter: Frontmatter,
    pub content: String,
    pub dependencies: Vec<String>,
    pub links: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub path: String,
    pub ok: bool,
    pub issues: Vec<ValidationIssue>,
}

pub fn read_note(vault: &Vault, title_or_path: &str) -> Result<NoteDocument> {
    let rel = vault.resolve_note(title_or_path)?;
    let abs = vault.to_abs(&rel);
    let raw = read_text(&abs)?;
    let parsed = split(&raw, vault.config().metadata_format);
    Ok(NoteDocument {
        path: abs.display().to_string(),
        title: rel.stem(),
        content: main_content(parsed.body).to_string(),
        dependencies: dependencies(parsed.body),
        links: extract_links(parsed.body),
        frontmatter: parsed.frontmatter,
    })
}

pub fn validate_note(vault: &Vault, title_or_path: &str) -> Result<ValidationReport> {
    let rel = vault.resolve_note(title_or_path)?;
    let abs = vault.to_abs(&rel);
    let raw = read_text(&abs)?;
    let issues = validate(&raw, vault.config().metadata_format);
    Ok(ValidationReport {
        path: abs.display().to_string(),
        ok: issues.is_empty(),
        issues,
    })
}
