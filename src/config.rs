use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Title similarity scorer used by fuzzy title search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    /// Ratcliff/Obershelp ratio over lowercased titles.
    #[default]
    Ratio,
    /// `nucleo` fuzzy matcher, normalized against the query's self-score.
    Nucleo,
}

/// Content search backend used by grep and hybrid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackendKind {
    /// Use `rg` when it is on `PATH`, otherwise the in-process scan.
    #[default]
    Auto,
    Regex,
    Ripgrep,
}

/// Parser used for the metadata block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataFormat {
    #[default]
    Yaml,
    /// Only `key: value` and `key:` followed by `- item` lines.
    Minimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// Directory names to ignore anywhere in the path.
    pub ignore_dirs: Vec<String>,
    /// File extension (without dot) of note files.
    pub note_extension: String,
    /// Suffix appended to a file name for its last-write backup.
    pub backup_suffix: String,
    /// Category seeded into newly created notes.
    pub default_category: String,
    /// Type seeded into newly created notes.
    pub default_type: String,
    /// Base version seeded into newly created notes.
    pub default_base_version: i64,
    /// Minimum score for fuzzy title search.
    pub title_threshold: f64,
    /// Minimum title score used by the title half of hybrid search.
    pub hybrid_title_threshold: f64,
    /// Maximum snippets collected per file by content search.
    pub max_snippets_per_file: usize,
    /// Default cap on files touched by one search-and-replace.
    pub max_files: usize,
    pub scorer: ScorerKind,
    pub content_search: SearchBackendKind,
    pub metadata_format: MetadataFormat,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![
                ".obsidian".into(),
                ".git".into(),
                ".trash".into(),
                "node_modules".into(),
            ],
            note_extension: "md".into(),
            backup_suffix: "bak".into(),
            default_category: "artifact".into(),
            default_type: "note".into(),
            default_base_version: 1,
            title_threshold: 55.0,
            hybrid_title_threshold: 50.0,
            max_snippets_per_file: 12,
            max_files: 1000,
            scorer: ScorerKind::default(),
            content_search: SearchBackendKind::default(),
            metadata_format: MetadataFormat::default(),
        }
    }
}

impl VaultConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        let ext = self.note_extension.trim_start_matches('.');
        if ext.is_empty() {
            return Err(Error::Config("note_extension is empty".into()));
        }
        if self.backup_suffix.trim_start_matches('.').is_empty() {
            return Err(Error::Config("backup_suffix is empty".into()));
        }
        if !(0.0..=100.0).contains(&self.title_threshold) {
            return Err(Error::Config("title_threshold must be within 0..=100".into()));
        }
        Ok(())
    }
}
