use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::backend::{Backends, ContentQuery, ContentSearcher, TitleScorer};
use crate::{Result, Vault};

pub const DEFAULT_TITLE_LIMIT: usize = 20;
pub const DEFAULT_GREP_LIMIT: usize = 2000;
pub const DEFAULT_HYBRID_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchReason {
    Title,
    Content,
    Hybrid,
}

/// One matching line. `match_start`/`match_end` count characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSnippet {
    pub line_no: usize,
    pub line: String,
    pub match_start: usize,
    pub match_end: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub path: String,
    pub score: f64,
    pub reason: MatchReason,
    pub snippets: Vec<MatchSnippet>,
}

#[derive(Debug, Clone)]
pub struct GrepOptions {
    pub query: String,
    pub regex: bool,
    /// `None` is smart case.
    pub case_sensitive: Option<bool>,
    pub context_lines: usize,
    pub limit: usize,
}

impl GrepOptions {
    pub fn literal(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            regex: false,
            case_sensitive: None,
            context_lines: 0,
            limit: DEFAULT_GREP_LIMIT,
        }
    }
}

/// Score descending, then case-insensitive title, then path.
fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
            .then_with(|| a.path.cmp(&b.path))
    });
}

pub fn content_score(snippets: usize) -> f64 {
    (40.0 + 2.0 * snippets as f64).min(95.0)
}

pub fn fuzzy_title_search(
    vault: &Vault,
    scorer: &dyn TitleScorer,
    query: &str,
    limit: usize,
    threshold: f64,
) -> Vec<SearchHit> {
    let q = query.trim();
    if q.is_empty() || limit == 0 {
        return Vec::new();
    }

    let files = vault.note_files();
    let titles: Vec<String> = files.iter().map(|p| p.stem()).collect();
    let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
    let scores = scorer.score_all(q, &refs);
    let candidates = refs.len();

    let mut hits: Vec<SearchHit> = files
        .iter()
        .zip(titles)
        .zip(scores)
        .filter(|(_, score)| *score >= threshold)
        .map(|((rel, title), score)| SearchHit {
            title,
            path: vault.to_abs(rel).display().to_string(),
            score,
            reason: MatchReason::Title,
            snippets: Vec::new(),
        })
        .collect();
    debug!(scorer = scorer.name(), candidates, hits = hits.len(), "title search");

    sort_hits(&mut hits);
    hits.truncate(limit);
    hits
}

pub fn grep(
    vault: &Vault,
    searcher: &dyn ContentSearcher,
    opts: &GrepOptions,
) -> Result<Vec<SearchHit>> {
    if opts.query.is_empty() || opts.limit == 0 {
        return Ok(Vec::new());
    }
    let query = ContentQuery {
        query: opts.query.clone(),
        regex: opts.regex,
        case_sensitive: opts.case_sensitive,
        context_lines: opts.context_lines,
        max_snippets: vault.config().max_snippets_per_file,
    };

    let mut hits: Vec<SearchHit> = searcher
        .search(vault, &query)?
        .into_iter()
        .map(|m| SearchHit {
            title: m.path.stem(),
            path: vault.to_abs(&m.path).display().to_string(),
            score: content_score(m.snippets.len()),
            reason: MatchReason::Content,
            snippets: m.snippets,
        })
        .collect();
    debug!(searcher = searcher.name(), hits = hits.len(), "content search");

    sort_hits(&mut hits);
    hits.truncate(opts.limit);
    Ok(hits)
}

/// Title and content hits fused by path; a path found both ways is a
/// `hybrid` hit with the higher score and the content snippets.
pub fn hybrid_search(
    vault: &Vault,
    backends: &Backends,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }
    let cfg = vault.config();
    let titles = fuzzy_title_search(
        vault,
        backends.scorer.as_ref(),
        query,
        limit.saturating_mul(2),
        cfg.hybrid_title_threshold,
    );
    let mut opts = GrepOptions::literal(query);
    opts.limit = limit.saturating_mul(4);
    let contents = grep(vault, backends.content.as_ref(), &opts)?;

    let mut by_path: BTreeMap<String, SearchHit> = BTreeMap::new();
    for hit in titles.into_iter().chain(contents) {
        match by_path.get_mut(&hit.path) {
            None => {
                by_path.insert(hit.path.clone(), hit);
            }
            Some(prev) => {
                prev.score = prev.score.max(hit.score);
                prev.reason = MatchReason::Hybrid;
                if hit.reason == MatchReason::Content {
                    prev.snippets = hit.snippets;
                }
            }
        }
    }

    let mut hits: Vec<SearchHit> = by_path.into_values().collect();
    sort_hits(&mut hits);
    hits.truncate(limit);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RatioScorer, RegexSearcher};

    fn vault_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Vault) {
        let temp = tempfile::tempdir().unwrap();
        for (name, body) in files {
            let path = temp.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        let vault = Vault::open(temp.path()).unwrap();
        (temp, vault)
    }

    #[test]
    fn content_score_is_capped() {
        assert_eq!(content_score(1), 42.0);
        assert_eq!(content_score(12), 64.0);
        assert_eq!(content_score(40), 95.0);
    }

    #[test]
    fn title_ties_break_case_insensitively() {
        let (_t, vault) = vault_with(&[("beta.md", ""), ("Alpha.md", ""), ("alpha.md.bak", "")]);
        let hits = fuzzy_title_search(&vault, &RatioScorer, "zzz", 10, 0.0);
        let titles: Vec<_> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "beta"]);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn grep_counts_snippets_per_file() {
        let (_t, vault) = vault_with(&[
            ("One.md", "todo\nnothing\nTODO again\n"),
            ("Two.md", "nothing here\n"),
        ]);
        let hits = grep(&vault, &RegexSearcher, &GrepOptions::literal("todo")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "One");
        assert_eq!(hits[0].snippets.len(), 2);
        assert_eq!(hits[0].score, 44.0);
        assert_eq!(hits[0].reason, MatchReason::Content);

        let mut opts = GrepOptions::literal("todo");
        opts.case_sensitive = Some(true);
        let hits = grep(&vault, &RegexSearcher, &opts).unwrap();
        assert_eq!(hits[0].snippets.len(), 1);
    }

    #[test]
    fn hybrid_merges_hits_for_the_same_path() {
        let (_t, vault) = vault_with(&[
            ("Roadmap.md", "roadmap for the year\n"),
            ("Other.md", "see the roadmap\n"),
        ]);
        let hits = hybrid_search(&vault, &Backends::default(), "roadmap", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Roadmap");
        assert_eq!(hits[0].reason, MatchReason::Hybrid);
        assert_eq!(hits[0].score, 100.0);
        assert_eq!(hits[0].snippets.len(), 1);
        assert_eq!(hits[1].reason, MatchReason::Content);
    }

    #[test]
    fn hybrid_accepts_an_unbounded_limit() {
        let (_t, vault) = vault_with(&[("Roadmap.md", "roadmap\n")]);
        let hits = hybrid_search(&vault, &Backends::default(), "roadmap", usize::MAX).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn repeated_matches_on_one_line_each_count() {
        let (_t, vault) = vault_with(&[("One.md", "todo todo todo\n")]);
        let hits = grep(&vault, &RegexSearcher, &GrepOptions::literal("todo")).unwrap();
        assert_eq!(hits[0].snippets.len(), 3);
        assert_eq!(hits[0].score, 46.0);
        let starts: Vec<_> = hits[0].snippets.iter().map(|s| s.match_start).collect();
        assert_eq!(starts, vec![0, 5, 10]);
    }
}
