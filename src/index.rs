use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::fsutil::read_text;
use crate::parse::{Frontmatter, extract_links, split};
use crate::{Error, MetadataFormat, Vault, VaultPath};

/// Index entry for one note.
#[derive(Debug, Clone, Serialize)]
pub struct NoteMeta {
    pub title: String,
    pub path: String,
    #[serde(skip)]
    pub rel: VaultPath,
    pub size: u64,
    #[serde(serialize_with = "serialize_mtime")]
    pub mtime: SystemTime,
    pub frontmatter: Frontmatter,
    pub tags: Vec<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub note_type: Option<String>,
    pub last_updated: Option<String>,
    pub links: BTreeSet<String>,
}

/// Seconds since the Unix epoch, as a float.
fn serialize_mtime<S: Serializer>(mtime: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
    let secs = mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    s.serialize_f64(secs)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub error: String,
}

/// Two files sharing a title; `kept` is the one in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleConflict {
    pub title: String,
    pub kept: String,
    pub dropped: String,
}

/// Read-only title → metadata view of a vault.
#[derive(Debug, Clone, Default)]
pub struct VaultIndex {
    notes: BTreeMap<String, NoteMeta>,
    skipped: Vec<SkippedFile>,
    conflicts: Vec<TitleConflict>,
}

impl VaultIndex {
    /// Scans every note file in sorted path order. Unreadable files are
    /// skipped and reported; on title collisions the later path wins.
    pub fn build(vault: &Vault) -> Self {
        let format = vault.config().metadata_format;
        let mut idx = Self::default();
        let files = vault.note_files();
        debug!(files = files.len(), "indexing vault");

        for rel in files {
            let abs = vault.to_abs(&rel);
            let meta = match index_file(vault, &rel, format) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(path = %abs.display(), error = %err, "skipping note");
                    idx.skipped.push(SkippedFile {
                        path: abs.display().to_string(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            if let Some(previous) = idx.notes.insert(meta.title.clone(), meta) {
                let kept = &idx.notes[&previous.title];
                warn!(
                    title = %previous.title,
                    kept = %kept.path,
                    dropped = %previous.path,
                    "duplicate note title"
                );
                idx.conflicts.push(TitleConflict {
                    title: previous.title.clone(),
                    kept: kept.path.clone(),
                    dropped: previous.path,
                });
            }
        }
        idx
    }

    pub fn notes(&self) -> &BTreeMap<String, NoteMeta> {
        &self.notes
    }

    pub fn get(&self, title: &str) -> Option<&NoteMeta> {
        self.notes.get(title)
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.notes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn conflicts(&self) -> &[TitleConflict] {
        &self.conflicts
    }

    /// Notes whose outbound links include `title`.
    pub fn linking_to(&self, title: &str) -> Vec<&NoteMeta> {
        self.notes
            .values()
            .filter(|n| n.links.contains(title))
            .collect()
    }
}

fn index_file(vault: &Vault, rel: &VaultPath, format: MetadataFormat) -> crate::Result<NoteMeta> {
    let abs = vault.to_abs(rel);
    let fs_meta = std::fs::metadata(&abs).map_err(|e| Error::io(&abs, e))?;
    let text = read_text(&abs)?;
    let parsed = split(&text, format);
    let fm = parsed.frontmatter;

    Ok(NoteMeta {
        title: rel.stem(),
        path: abs.display().to_string(),
        rel: rel.clone(),
        size: fs_meta.len(),
        mtime: fs_meta.modified().unwrap_or(UNIX_EPOCH),
        tags: fm.tags.clone().unwrap_or_default(),
        category: fm.category.clone(),
        note_type: fm.note_type.clone(),
        last_updated: fm.last_updated.clone(),
        links: extract_links(parsed.body),
        frontmatter: fm,
    })
}
