use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobMatcher};
use tracing::warn;

use crate::{Error, Result, VaultConfig};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VaultPath(PathBuf);

impl VaultPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn as_str_lossy(&self) -> String {
        self.0.to_string_lossy().to_string()
    }

    /// File stem, which is the note title for note files.
    pub fn stem(&self) -> String {
        self.0
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl TryFrom<&Path> for VaultPath {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        if value.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }
        if value.is_absolute() {
            return Err(Error::InvalidVaultPath(
                "absolute paths are not allowed".into(),
            ));
        }

        let mut cleaned = PathBuf::new();
        for c in value.components() {
            match c {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(Error::InvalidVaultPath(
                        "absolute paths are not allowed".into(),
                    ));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(Error::InvalidVaultPath(
                        "path traversal is not allowed".into(),
                    ));
                }
                Component::Normal(part) => cleaned.push(part),
            }
        }

        if cleaned.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }

        Ok(Self(cleaned))
    }
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    cfg: VaultConfig,
}

impl Vault {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(root, VaultConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, cfg: VaultConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::VaultNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, cfg })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.cfg
    }

    pub fn to_abs(&self, rel: &VaultPath) -> PathBuf {
        self.root.join(rel.as_path())
    }

    pub fn to_rel(&self, abs: &Path) -> Result<VaultPath> {
        let abs = if abs.is_absolute() {
            abs.to_path_buf()
        } else {
            self.root.join(abs)
        };

        let abs = std::fs::canonicalize(&abs).unwrap_or(abs);
        if !abs.starts_with(&self.root) {
            return Err(Error::PathOutsideVault(abs));
        }
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathOutsideVault(abs.clone()))?;
        VaultPath::try_from(rel)
    }

    pub fn is_ignored_rel(&self, rel: &Path) -> bool {
        rel.components().any(|c| {
            let Component::Normal(part) = c else {
                return false;
            };
            let s = part.to_string_lossy();
            self.cfg.ignore_dirs.iter().any(|d| d == &s)
        })
    }

    pub fn is_indexable_rel(&self, rel: &Path) -> bool {
        if self.is_ignored_rel(rel) {
            return false;
        }

        if rel.as_os_str().is_empty() {
            return false;
        }
        let file_name = rel.file_name().and_then(|s| s.to_str()).unwrap_or("");
        !file_name.starts_with('.')
    }

    pub fn is_note_rel(&self, rel: &Path) -> bool {
        rel.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(self.note_extension()))
    }

    pub fn note_extension(&self) -> &str {
        self.cfg.note_extension.trim_start_matches('.')
    }

    /// Absolute path of the note file for an (already normalized) title.
    pub fn note_path(&self, title: &str) -> PathBuf {
        self.root.join(format!("{title}.{}", self.note_extension()))
    }

    /// Every indexable file under the root, sorted by relative path.
    pub fn files(&self) -> Vec<VaultPath> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable vault entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if !self.is_indexable_rel(rel) {
                continue;
            }
            if let Ok(rel) = VaultPath::try_from(rel) {
                out.push(rel);
            }
        }
        out.sort();
        out
    }

    /// Every note file under the root, sorted by relative path.
    pub fn note_files(&self) -> Vec<VaultPath> {
        self.files()
            .into_iter()
            .filter(|p| self.is_note_rel(p.as_path()))
            .collect()
    }

    /// Indexable files whose relative path matches `include_pattern`.
    pub fn matching_files(&self, include_pattern: &str) -> Result<Vec<VaultPath>> {
        let matcher = compile_include(include_pattern)?;
        Ok(self
            .files()
            .into_iter()
            .filter(|p| matcher.is_match(p.as_path()))
            .collect())
    }

    /// Resolves a caller-supplied path (absolute, or relative to the root).
    pub fn resolve_path(&self, raw: &str) -> Result<VaultPath> {
        let p = Path::new(raw.trim());
        if p.as_os_str().is_empty() {
            return Err(Error::InvalidVaultPath("empty path".into()));
        }
        self.to_rel(p)
    }

    /// Resolves a note by title or by path.
    ///
    /// Values ending in the note extension are treated as paths. Titles map
    /// to `<root>/<title>.<ext>`, falling back to a unique stem match anywhere
    /// in the vault.
    pub fn resolve_note(&self, title_or_path: &str) -> Result<VaultPath> {
        let raw = title_or_path.trim();
        if raw.is_empty() {
            return Err(Error::InvalidInput("empty title or path".into()));
        }
        if self.is_note_rel(Path::new(raw)) {
            let rel = self.resolve_path(raw)?;
            let abs = self.to_abs(&rel);
            if !abs.is_file() {
                return Err(Error::NotFound(abs));
            }
            return Ok(rel);
        }

        let direct = self.note_path(raw);
        if direct.is_file() {
            return self.to_rel(&direct);
        }

        let mut matches: Vec<VaultPath> = self
            .note_files()
            .into_iter()
            .filter(|p| p.stem() == raw)
            .collect();
        match matches.len() {
            0 => Err(Error::NotFound(direct)),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::InvalidInput(format!(
                "title {raw:?} is ambiguous: {}",
                matches
                    .iter()
                    .map(|p| p.as_str_lossy())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

fn compile_include(pattern: &str) -> Result<GlobMatcher> {
    let pattern = pattern.trim();
    let pattern = if pattern.is_empty() { "**/*" } else { pattern };
    Ok(Glob::new(pattern)?.compile_matcher())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_paths_reject_traversal_and_absolute_paths() {
        assert!(VaultPath::try_from(Path::new("../x.md")).is_err());
        assert!(VaultPath::try_from(Path::new("/x.md")).is_err());
        let p = VaultPath::try_from(Path::new("./notes/x.md")).unwrap();
        assert_eq!(p.as_path(), Path::new("notes/x.md"));
        assert_eq!(p.stem(), "x");
    }

    #[test]
    fn file_listing_skips_ignored_dirs_and_dotfiles() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join(".git/x.md"), "x").unwrap();
        std::fs::write(root.join(".hidden.md"), "x").unwrap();
        std::fs::write(root.join("a.md"), "x").unwrap();
        std::fs::write(root.join("a.md.bak"), "x").unwrap();
        std::fs::write(root.join("sub/b.md"), "x").unwrap();

        let vault = Vault::open(root).unwrap();
        let notes: Vec<_> = vault.note_files().iter().map(|p| p.as_str_lossy()).collect();
        assert_eq!(notes, vec!["a.md".to_string(), "sub/b.md".to_string()]);

        let sub = vault.matching_files("sub/**").unwrap();
        assert_eq!(sub.len(), 1);
    }

    #[test]
    fn resolve_note_falls_back_to_unique_stem() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("deep")).unwrap();
        std::fs::write(root.join("deep/Inner.md"), "x").unwrap();

        let vault = Vault::open(root).unwrap();
        let rel = vault.resolve_note("Inner").unwrap();
        assert_eq!(rel.as_path(), Path::new("deep/Inner.md"));
        assert!(matches!(
            vault.resolve_note("Missing"),
            Err(Error::NotFound(_))
        ));
    }
}
