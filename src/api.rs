//! Async facade over the vault operations.
//!
//! Every method takes the vault root explicitly, runs its file work on the
//! blocking pool and returns an [`Envelope`]; errors and task panics become
//! `ok: false` envelopes instead of propagating.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::backend::Backends;
use crate::compare::{self, DEFAULT_CONTEXT_LINES};
use crate::edit::{self, CancelToken, CreateNote, RenameRequest, ReplaceRequest};
use crate::fsutil::read_text;
use crate::index::VaultIndex;
use crate::note::{self, main_content};
use crate::parse::{Frontmatter, dependencies, split};
use crate::search::{
    self, DEFAULT_HYBRID_LIMIT, DEFAULT_TITLE_LIMIT, GrepOptions, MatchReason, MatchSnippet,
    SearchHit,
};
use crate::{Error, Result, Vault, VaultConfig};

/// Uniform result of every facade call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub ok: bool,
    pub data: Value,
    pub error: Option<String>,
    pub meta: Map<String, Value>,
}

impl Envelope {
    pub fn success(data: Value, meta: Map<String, Value>) -> Self {
        Self {
            ok: true,
            data,
            error: None,
            meta,
        }
    }

    pub fn failure(err: &Error) -> Self {
        let mut meta = Map::new();
        meta.insert("kind".into(), Value::from(err.kind().as_str()));
        Self {
            ok: false,
            data: Value::Null,
            error: Some(err.to_string()),
            meta,
        }
    }

    /// `meta.kind` of a failed call.
    pub fn kind(&self) -> Option<&str> {
        self.meta.get("kind").and_then(Value::as_str)
    }
}

/// Serialized payload plus envelope metadata.
struct Outcome {
    data: Value,
    meta: Map<String, Value>,
}

impl Outcome {
    fn of<T: Serialize>(data: &T) -> Result<Self> {
        Ok(Self {
            data: serde_json::to_value(data)?,
            meta: Map::new(),
        })
    }

    fn counted<T: Serialize>(items: &[T]) -> Result<Self> {
        Self::of(&items).map(|o| o.with("count", items.len()))
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Title,
    Content,
    #[default]
    Hybrid,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Strategy::Title),
            "content" => Ok(Strategy::Content),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(Error::InvalidInput(format!("unknown strategy: {other}"))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Title => "title",
            Strategy::Content => "content",
            Strategy::Hybrid => "hybrid",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BundleRequest {
    pub query: String,
    pub strategy: Strategy,
    pub top_k: usize,
    pub include_dependencies: bool,
}

impl Default for BundleRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            strategy: Strategy::Hybrid,
            top_k: 8,
            include_dependencies: true,
        }
    }
}

/// One note of a context bundle.
#[derive(Debug, Clone, Serialize)]
pub struct BundleItem {
    pub title: String,
    pub path: String,
    pub frontmatter: Frontmatter,
    pub content: String,
    pub dependencies: Vec<String>,
    pub score: f64,
    pub reason: MatchReason,
    pub snippets: Vec<MatchSnippet>,
}

#[derive(Debug, Clone)]
pub struct CastApi {
    cfg: VaultConfig,
    backends: Backends,
}

impl CastApi {
    /// Picks the search backends once, from `cfg`.
    pub fn new(cfg: VaultConfig) -> Result<Self> {
        let backends = Backends::from_config(&cfg)?;
        Ok(Self { cfg, backends })
    }

    pub fn with_backends(cfg: VaultConfig, backends: Backends) -> Self {
        Self { cfg, backends }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.cfg
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    async fn blocking<F>(&self, root: &Path, f: F) -> Envelope
    where
        F: FnOnce(&Vault, &Backends) -> Result<Outcome> + Send + 'static,
    {
        let cfg = self.cfg.clone();
        let backends = self.backends.clone();
        let root: PathBuf = root.to_path_buf();
        run(move || {
            let vault = Vault::with_config(root, cfg)?;
            f(&vault, &backends)
        })
        .await
    }

    pub async fn search_titles_fuzzy(
        &self,
        root: impl AsRef<Path>,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f64>,
    ) -> Envelope {
        let query = query.to_string();
        let limit = limit.unwrap_or(DEFAULT_TITLE_LIMIT);
        let threshold = threshold.unwrap_or(self.cfg.title_threshold);
        self.blocking(root.as_ref(), move |vault, backends| {
            let hits =
                search::fuzzy_title_search(vault, backends.scorer.as_ref(), &query, limit, threshold);
            Outcome::counted(&hits)
        })
        .await
    }

    pub async fn grep(&self, root: impl AsRef<Path>, opts: GrepOptions) -> Envelope {
        self.blocking(root.as_ref(), move |vault, backends| {
            let hits = search::grep(vault, backends.content.as_ref(), &opts)?;
            Outcome::counted(&hits)
        })
        .await
    }

    pub async fn search_all(
        &self,
        root: impl AsRef<Path>,
        query: &str,
        limit: Option<usize>,
    ) -> Envelope {
        let query = query.to_string();
        let limit = limit.unwrap_or(DEFAULT_HYBRID_LIMIT);
        self.blocking(root.as_ref(), move |vault, backends| {
            let hits = search::hybrid_search(vault, backends, &query, limit)?;
            Outcome::counted(&hits)
        })
        .await
    }

    pub async fn read_note(&self, root: impl AsRef<Path>, title_or_path: &str) -> Envelope {
        let target = title_or_path.to_string();
        self.blocking(root.as_ref(), move |vault, _| {
            Outcome::of(&note::read_note(vault, &target)?)
        })
        .await
    }

    pub async fn build_index(&self, root: impl AsRef<Path>) -> Envelope {
        self.blocking(root.as_ref(), |vault, _| {
            let idx = VaultIndex::build(vault);
            Ok(Outcome::of(idx.notes())?
                .with("count", idx.len())
                .with("skipped", serde_json::to_value(idx.skipped())?)
                .with("conflicts", serde_json::to_value(idx.conflicts())?))
        })
        .await
    }

    pub async fn create_note(&self, root: impl AsRef<Path>, req: CreateNote) -> Envelope {
        self.blocking(root.as_ref(), move |vault, _| {
            Outcome::of(&edit::create_note(vault, &req)?)
        })
        .await
    }

    pub async fn search_replace(
        &self,
        root: impl AsRef<Path>,
        req: ReplaceRequest,
        cancel: CancelToken,
    ) -> Envelope {
        self.blocking(root.as_ref(), move |vault, _| {
            let report = edit::search_replace(vault, &req, &cancel)?;
            Ok(Outcome::of(&report)?
                .with("changed", report.changed.len())
                .with("failed", report.failed.len()))
        })
        .await
    }

    pub async fn rename_title(
        &self,
        root: impl AsRef<Path>,
        req: RenameRequest,
        cancel: CancelToken,
    ) -> Envelope {
        self.blocking(root.as_ref(), move |vault, _| {
            let report = edit::rename_title(vault, &req, &cancel)?;
            Ok(Outcome::of(&report)?.with("updated", report.link_updates.len()))
        })
        .await
    }

    pub async fn compare_files(
        &self,
        root: impl AsRef<Path>,
        a_path: &str,
        b_path: &str,
        context: Option<usize>,
    ) -> Envelope {
        let (a, b) = (a_path.to_string(), b_path.to_string());
        let context = context.unwrap_or(DEFAULT_CONTEXT_LINES);
        self.blocking(root.as_ref(), move |vault, _| {
            Outcome::of(&compare::compare_files(vault, &a, &b, context)?)
        })
        .await
    }

    pub async fn compare_text(
        &self,
        a: &str,
        b: &str,
        a_label: &str,
        b_label: &str,
        context: Option<usize>,
    ) -> Envelope {
        let (a, b) = (a.to_string(), b.to_string());
        let (a_label, b_label) = (a_label.to_string(), b_label.to_string());
        let context = context.unwrap_or(DEFAULT_CONTEXT_LINES);
        run(move || {
            Outcome::of(&compare::compare_text(&a, &b, &a_label, &b_label, context))
        })
        .await
    }

    pub async fn compare_metadata(
        &self,
        root: impl AsRef<Path>,
        a_path: &str,
        b_path: &str,
    ) -> Envelope {
        let (a, b) = (a_path.to_string(), b_path.to_string());
        self.blocking(root.as_ref(), move |vault, _| {
            let delta = compare::compare_metadata(vault, &a, &b)?;
            Ok(Outcome::of(&delta)?.with("count", delta.len()))
        })
        .await
    }

    pub async fn validate_note(&self, root: impl AsRef<Path>, title_or_path: &str) -> Envelope {
        let target = title_or_path.to_string();
        self.blocking(root.as_ref(), move |vault, _| {
            Outcome::of(&note::validate_note(vault, &target)?)
        })
        .await
    }

    /// Search hits expanded with each note's metadata, main content and
    /// dependencies.
    pub async fn context_bundle(&self, root: impl AsRef<Path>, req: BundleRequest) -> Envelope {
        self.blocking(root.as_ref(), move |vault, backends| {
            let hits = bundle_hits(vault, backends, &req)?;
            let items: Vec<BundleItem> = hits
                .into_iter()
                .filter_map(|hit| bundle_item(vault, hit, req.include_dependencies))
                .collect();
            Outcome::counted(&items)
        })
        .await
    }
}

async fn run<F>(f: F) -> Envelope
where
    F: FnOnce() -> Result<Outcome> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Task(e.to_string()));
    match joined.and_then(|r| r) {
        Ok(outcome) => Envelope::success(outcome.data, outcome.meta),
        Err(err) => Envelope::failure(&err),
    }
}

fn bundle_hits(vault: &Vault, backends: &Backends, req: &BundleRequest) -> Result<Vec<SearchHit>> {
    match req.strategy {
        Strategy::Title => Ok(search::fuzzy_title_search(
            vault,
            backends.scorer.as_ref(),
            &req.query,
            req.top_k,
            vault.config().title_threshold,
        )),
        Strategy::Content => {
            let mut opts = GrepOptions::literal(req.query.clone());
            opts.limit = req.top_k;
            search::grep(vault, backends.content.as_ref(), &opts)
        }
        Strategy::Hybrid => search::hybrid_search(vault, backends, &req.query, req.top_k),
    }
}

fn bundle_item(vault: &Vault, hit: SearchHit, include_dependencies: bool) -> Option<BundleItem> {
    let raw = match read_text(Path::new(&hit.path)) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %hit.path, error = %err, "dropping bundle entry");
            return None;
        }
    };
    let parsed = split(&raw, vault.config().metadata_format);
    Some(BundleItem {
        content: main_content(parsed.body).trim().to_string(),
        dependencies: if include_dependencies {
            dependencies(parsed.body)
        } else {
            Vec::new()
        },
        frontmatter: parsed.frontmatter,
        title: hit.title,
        path: hit.path,
        score: hit.score,
        reason: hit.reason,
        snippets: hit.snippets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelopes_carry_the_error_kind() {
        let env = Envelope::failure(&Error::AlreadyExists(PathBuf::from("/v/A.md")));
        assert!(!env.ok);
        assert_eq!(env.kind(), Some("already_exists"));
        assert_eq!(env.error.as_deref(), Some("target exists: /v/A.md"));
        assert_eq!(env.data, Value::Null);
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("Title".parse::<Strategy>().unwrap(), Strategy::Title);
        assert_eq!(" hybrid ".parse::<Strategy>().unwrap(), Strategy::Hybrid);
        assert!("semantic".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Content.to_string(), "content");
    }

    #[tokio::test]
    async fn task_panics_become_internal_failures() {
        let env = run(|| -> Result<Outcome> { panic!("boom") }).await;
        assert!(!env.ok);
        assert_eq!(env.kind(), Some("internal"));
    }
}
