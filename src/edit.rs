//! Write paths: note creation, multi-file search-and-replace, and title
//! renames with link rewriting.
//!
//! Every single-file write goes through [`atomic_write`], which leaves a
//! backup of the previous content next to the file. Batches are not
//! transactional: a failure on one file is recorded and the batch moves on.

use std::path::Path;
use std::sync::Arc;

use regex::{NoExpand, RegexBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::compare::{DEFAULT_CONTEXT_LINES, unified_diff};
use crate::fsutil::{atomic_write, now_timestamp, read_text};
use crate::note::{build_new_note, normalize_title, touch_last_updated};
use crate::parse::{Frontmatter, wikilinks};
use crate::{Error, Result, Vault, VaultPath};

pub const DEFAULT_INCLUDE_PATTERN: &str = "**/*.md";

/// Cooperative cancellation flag, checked between files.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|c| *c).await;
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateNote {
    pub title: String,
    pub content: String,
    /// Overrides applied field by field on top of the defaults.
    pub frontmatter: Option<Frontmatter>,
    pub dependencies: Vec<String>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReport {
    pub created: bool,
    pub path: String,
    pub title: String,
}

pub fn create_note(vault: &Vault, req: &CreateNote) -> Result<CreateReport> {
    let title = normalize_title(&req.title);
    if title.is_empty() {
        return Err(Error::InvalidTitle(req.title.clone()));
    }
    let path = vault.note_path(&title);
    if path.exists() && !req.overwrite {
        return Err(Error::AlreadyExists(path));
    }

    let cfg = vault.config();
    let mut fm = Frontmatter {
        last_updated: Some(now_timestamp()),
        category: Some(cfg.default_category.clone()),
        note_type: Some(cfg.default_type.clone()),
        base_version: Some(cfg.default_base_version),
        ..Default::default()
    };
    if let Some(overrides) = &req.frontmatter {
        fm.merge(overrides.clone());
    }

    let text = build_new_note(&fm, &req.content, &req.dependencies)?;
    atomic_write(&path, &text, &cfg.backup_suffix)?;
    info!(path = %path.display(), title = %title, "note created");

    Ok(CreateReport {
        created: true,
        path: path.display().to_string(),
        title,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplaceRequest {
    pub find: String,
    pub replace: String,
    /// Treat `find` as a pattern; `replace` may then use `$1` / `${name}`.
    pub regex: bool,
    /// `None` is case sensitive.
    pub case_sensitive: Option<bool>,
    pub include_pattern: String,
    /// Explicit candidates, relative to the vault root. Overrides
    /// `include_pattern` when non-empty.
    pub paths: Vec<String>,
    pub dry_run: bool,
    pub max_files: Option<usize>,
}

impl Default for ReplaceRequest {
    fn default() -> Self {
        Self {
            find: String::new(),
            replace: String::new(),
            regex: false,
            case_sensitive: None,
            include_pattern: DEFAULT_INCLUDE_PATTERN.to_string(),
            paths: Vec::new(),
            dry_run: true,
            max_files: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub replacements: usize,
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    pub changed: Vec<FileChange>,
    pub failed: Vec<FileFailure>,
    pub dry_run: bool,
    pub cancelled: bool,
}

pub fn search_replace(
    vault: &Vault,
    req: &ReplaceRequest,
    cancel: &CancelToken,
) -> Result<ReplaceReport> {
    if req.find.is_empty() {
        return Err(Error::InvalidInput("find must not be empty".into()));
    }
    let pattern = if req.regex {
        req.find.clone()
    } else {
        regex::escape(&req.find)
    };
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(req.case_sensitive == Some(false))
        .build()?;

    let mut report = ReplaceReport {
        dry_run: req.dry_run,
        ..Default::default()
    };
    let max_files = req.max_files.unwrap_or(vault.config().max_files);
    let candidates = replace_candidates(vault, req, max_files, &mut report.failed)?;
    debug!(candidates = candidates.len(), dry_run = req.dry_run, "search and replace");

    for rel in candidates {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let abs = vault.to_abs(&rel);
        match replace_in_file(vault, &abs, &re, req) {
            Ok(Some(change)) => report.changed.push(change),
            Ok(None) => {}
            Err(err) => {
                warn!(path = %abs.display(), error = %err, "replace failed");
                report.failed.push(FileFailure {
                    path: abs.display().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn replace_candidates(
    vault: &Vault,
    req: &ReplaceRequest,
    max_files: usize,
    failed: &mut Vec<FileFailure>,
) -> Result<Vec<VaultPath>> {
    let mut out: Vec<VaultPath> = if req.paths.is_empty() {
        vault
            .matching_files(&req.include_pattern)?
            .into_iter()
            .filter(|p| vault.is_note_rel(p.as_path()))
            .collect()
    } else {
        let mut explicit = Vec::new();
        for raw in &req.paths {
            let resolved = vault.resolve_path(raw).and_then(|rel| {
                let abs = vault.to_abs(&rel);
                if abs.is_file() {
                    Ok(rel)
                } else {
                    Err(Error::NotFound(abs))
                }
            });
            match resolved {
                Ok(rel) => explicit.push(rel),
                Err(err) => failed.push(FileFailure {
                    path: raw.clone(),
                    error: err.to_string(),
                }),
            }
        }
        explicit
    };
    out.sort();
    out.dedup();
    out.truncate(max_files);
    Ok(out)
}

fn replace_in_file(
    vault: &Vault,
    abs: &Path,
    re: &regex::Regex,
    req: &ReplaceRequest,
) -> Result<Option<FileChange>> {
    let text = read_text(abs)?;
    let count = re.find_iter(&text).count();
    if count == 0 {
        return Ok(None);
    }

    let replaced = if req.regex {
        re.replace_all(&text, req.replace.as_str())
    } else {
        re.replace_all(&text, NoExpand(&req.replace))
    };
    let cfg = vault.config();
    let new_text = touch_last_updated(&replaced, &now_timestamp(), cfg.metadata_format);

    let label = abs.display().to_string();
    let diff = unified_diff(
        &text,
        &new_text,
        &format!("{label} (old)"),
        &format!("{label} (new)"),
        DEFAULT_CONTEXT_LINES,
    );
    if !req.dry_run {
        atomic_write(abs, &new_text, &cfg.backup_suffix)?;
        info!(path = %label, replacements = count, "replaced");
    }
    Ok(Some(FileChange {
        path: label,
        replacements: count,
        diff,
    }))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenameRequest {
    pub old_title: String,
    pub new_title: String,
    pub update_links: bool,
    pub include_pattern: String,
}

impl Default for RenameRequest {
    fn default() -> Self {
        Self {
            old_title: String::new(),
            new_title: String::new(),
            update_links: true,
            include_pattern: DEFAULT_INCLUDE_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkUpdate {
    pub path: String,
    pub updates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameReport {
    pub old_title: String,
    pub new_title: String,
    pub path: String,
    pub link_updates: Vec<LinkUpdate>,
    pub failed: Vec<FileFailure>,
    pub cancelled: bool,
}

/// Renames a note file in place and, optionally, every wikilink pointing
/// at it.
pub fn rename_title(
    vault: &Vault,
    req: &RenameRequest,
    cancel: &CancelToken,
) -> Result<RenameReport> {
    let old_title = normalize_title(&req.old_title);
    if old_title.is_empty() {
        return Err(Error::InvalidTitle(req.old_title.clone()));
    }
    let new_title = normalize_title(&req.new_title);
    if new_title.is_empty() {
        return Err(Error::InvalidTitle(req.new_title.clone()));
    }

    let old_rel = vault.resolve_note(&old_title)?;
    let old_abs = vault.to_abs(&old_rel);
    let new_abs = old_abs.with_file_name(format!("{new_title}.{}", vault.note_extension()));
    if new_abs.exists() {
        return Err(Error::AlreadyExists(new_abs));
    }
    std::fs::rename(&old_abs, &new_abs).map_err(|e| Error::io(&old_abs, e))?;
    info!(from = %old_abs.display(), to = %new_abs.display(), "note renamed");

    let mut report = RenameReport {
        old_title,
        new_title,
        path: new_abs.display().to_string(),
        link_updates: Vec::new(),
        failed: Vec::new(),
        cancelled: false,
    };
    if !req.update_links {
        return Ok(report);
    }

    let candidates: Vec<VaultPath> = vault
        .matching_files(&req.include_pattern)?
        .into_iter()
        .filter(|p| vault.is_note_rel(p.as_path()))
        .collect();
    for rel in candidates {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let abs = vault.to_abs(&rel);
        match relink_file(vault, &abs, &report.old_title, &report.new_title) {
            Ok(0) => {}
            Ok(updates) => report.link_updates.push(LinkUpdate {
                path: abs.display().to_string(),
                updates,
            }),
            Err(err) => {
                warn!(path = %abs.display(), error = %err, "link update failed");
                report.failed.push(FileFailure {
                    path: abs.display().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn relink_file(vault: &Vault, abs: &Path, old: &str, new: &str) -> Result<usize> {
    let text = read_text(abs)?;
    let (rewritten, updates) = rewrite_link_targets(&text, old, new);
    if updates == 0 {
        return Ok(0);
    }
    let cfg = vault.config();
    let rewritten = touch_last_updated(&rewritten, &now_timestamp(), cfg.metadata_format);
    atomic_write(abs, &rewritten, &cfg.backup_suffix)?;
    debug!(path = %abs.display(), updates, "links rewritten");
    Ok(updates)
}

/// Replaces the target of every wikilink whose trimmed target is exactly
/// `old`. Sections, aliases, block ids and embed markers are untouched.
pub fn rewrite_link_targets(text: &str, old: &str, new: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut last = 0usize;
    let mut updates = 0usize;
    for link in wikilinks(text) {
        if link.target != old {
            continue;
        }
        out.push_str(&text[last..link.target_span.start]);
        out.push_str(new);
        last = link.target_span.end;
        updates += 1;
    }
    out.push_str(&text[last..]);
    (out, updates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_keeps_suffixes_and_skips_prefix_matches() {
        let text = "[[A]] [[A#Sec]] [[A|Alias]] ![[A^blk]] [[ A ]] [[AB]] [[A B]]";
        let (out, n) = rewrite_link_targets(text, "A", "C");
        assert_eq!(n, 5);
        assert_eq!(
            out,
            "[[C]] [[C#Sec]] [[C|Alias]] ![[C^blk]] [[ C ]] [[AB]] [[A B]]"
        );
    }

    #[test]
    fn rewrite_without_matches_is_identity() {
        let (out, n) = rewrite_link_targets("plain [[Other]]", "A", "C");
        assert_eq!(n, 0);
        assert_eq!(out, "plain [[Other]]");
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn create_rejects_empty_title_and_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let vault = Vault::open(temp.path()).unwrap();

        let req = CreateNote {
            title: "///".into(),
            ..Default::default()
        };
        assert!(matches!(create_note(&vault, &req), Err(Error::InvalidTitle(_))));

        let req = CreateNote {
            title: "Note".into(),
            ..Default::default()
        };
        create_note(&vault, &req).unwrap();
        assert!(matches!(create_note(&vault, &req), Err(Error::AlreadyExists(_))));

        let overwrite = CreateNote {
            overwrite: true,
            content: "v2".into(),
            ..req
        };
        assert!(create_note(&vault, &overwrite).unwrap().created);
        assert!(temp.path().join("Note.md.bak").is_file());
    }

    #[test]
    fn literal_replacement_does_not_expand_groups() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("N.md"), "cost: 5\n").unwrap();
        let vault = Vault::open(temp.path()).unwrap();

        let req = ReplaceRequest {
            find: "5".into(),
            replace: "$1".into(),
            dry_run: false,
            ..Default::default()
        };
        let report = search_replace(&vault, &req, &CancelToken::new()).unwrap();
        assert_eq!(report.changed.len(), 1);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("N.md")).unwrap(),
            "cost: $1\n"
        );
    }

    #[test]
    fn missing_explicit_paths_are_reported_as_failures() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.md"), "x\n").unwrap();
        let vault = Vault::open(temp.path()).unwrap();

        let req = ReplaceRequest {
            find: "x".into(),
            replace: "y".into(),
            paths: vec!["a.md".into(), "missing.md".into()],
            ..Default::default()
        };
        let report = search_replace(&vault, &req, &CancelToken::new()).unwrap();
        assert_eq!(report.changed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "missing.md");
        assert!(report.failed[0].error.starts_with("not found"));
    }

    #[test]
    fn cancelled_batch_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("N.md"), "x\n").unwrap();
        let vault = Vault::open(temp.path()).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let req = ReplaceRequest {
            find: "x".into(),
            replace: "y".into(),
            dry_run: false,
            ..Default::default()
        };
        let report = search_replace(&vault, &req, &token).unwrap();
        assert!(report.cancelled);
        assert!(report.changed.is_empty());
        assert_eq!(std::fs::read_to_string(temp.path().join("N.md")).unwrap(), "x\n");
    }
}
