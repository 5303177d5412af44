//! Pluggable accelerators: title similarity scoring and content search.
//!
//! Both have a pure in-process implementation and an optional faster one.
//! [`Backends::from_config`] picks them once, when the API facade is built.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use nucleo::{
    Matcher, Utf32Str,
    pattern::{CaseMatching, Normalization, Pattern},
};
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::fsutil::read_text;
use crate::search::MatchSnippet;
use crate::{Error, Result, ScorerKind, SearchBackendKind, Vault, VaultConfig, VaultPath};

/// Scores titles against a query on a 0 to 100 scale.
pub trait TitleScorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// One score per candidate, in input order.
    fn score_all(&self, query: &str, candidates: &[&str]) -> Vec<f64>;
}

/// Ratcliff/Obershelp similarity (`2 * matches / total chars`) over
/// lowercased strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct RatioScorer;

impl RatioScorer {
    pub fn ratio(a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.to_lowercase().chars().collect();
        let b: Vec<char> = b.to_lowercase().chars().collect();
        let total = a.len() + b.len();
        if total == 0 {
            return 0.0;
        }
        100.0 * 2.0 * matching_chars(&a, &b) as f64 / total as f64
    }
}

impl TitleScorer for RatioScorer {
    fn name(&self) -> &'static str {
        "ratio"
    }

    fn score_all(&self, query: &str, candidates: &[&str]) -> Vec<f64> {
        if query.trim().is_empty() {
            return vec![0.0; candidates.len()];
        }
        candidates.iter().map(|c| Self::ratio(query, c)).collect()
    }
}

/// Total size of the matching blocks found by recursively taking the
/// longest common substring and recursing on both sides of it.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0usize;
    let mut stack = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = stack.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            stack.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            stack.push((i + k, ahi, j + k, bhi));
        }
    }
    total
}

/// Longest common run in `a[alo..ahi]` / `b[blo..bhi]`; earliest in `a`,
/// then earliest in `b`, wins ties.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut besti, mut bestj, mut bestk) = (alo, blo, 0usize);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[col - 1] + 1;
                cur[col] = k;
                if k > bestk {
                    besti = i + 1 - k;
                    bestj = j + 1 - k;
                    bestk = k;
                }
            } else {
                cur[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    (besti, bestj, bestk)
}

/// `nucleo` fuzzy scores, normalized by the score of the query against
/// itself and clamped to 100.
#[derive(Debug, Default, Clone, Copy)]
pub struct NucleoScorer;

impl TitleScorer for NucleoScorer {
    fn name(&self) -> &'static str {
        "nucleo"
    }

    fn score_all(&self, query: &str, candidates: &[&str]) -> Vec<f64> {
        let q = query.trim();
        if q.is_empty() {
            return vec![0.0; candidates.len()];
        }

        let pattern = Pattern::parse(q, CaseMatching::Ignore, Normalization::Smart);
        let mut matcher = Matcher::new(nucleo::Config::DEFAULT);
        let mut utf32_buf = Vec::new();
        let best = pattern
            .score(Utf32Str::new(q, &mut utf32_buf), &mut matcher)
            .unwrap_or(0);
        if best == 0 {
            return vec![0.0; candidates.len()];
        }

        candidates
            .iter()
            .map(|c| {
                pattern
                    .score(Utf32Str::new(c, &mut utf32_buf), &mut matcher)
                    .map(|s| (100.0 * f64::from(s) / f64::from(best)).min(100.0))
                    .unwrap_or(0.0)
            })
            .collect()
    }
}

/// A literal or pattern query over note contents.
#[derive(Debug, Clone)]
pub struct ContentQuery {
    pub query: String,
    pub regex: bool,
    /// `None` means smart case: insensitive unless the query has an
    /// uppercase character.
    pub case_sensitive: Option<bool>,
    pub context_lines: usize,
    pub max_snippets: usize,
}

impl ContentQuery {
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
            .unwrap_or_else(|| self.query.chars().any(char::is_uppercase))
    }

    pub fn compile(&self) -> Result<Regex> {
        let pattern = if self.regex {
            self.query.clone()
        } else {
            regex::escape(&self.query)
        };
        Ok(RegexBuilder::new(&pattern)
            .case_insensitive(!self.is_case_sensitive())
            .build()?)
    }
}

/// Snippets found in one note file.
#[derive(Debug, Clone)]
pub struct FileMatches {
    pub path: VaultPath,
    pub snippets: Vec<MatchSnippet>,
}

pub trait ContentSearcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every note file with at least one matching line, in path order.
    fn search(&self, vault: &Vault, query: &ContentQuery) -> Result<Vec<FileMatches>>;
}

/// Scans every note file in process with `regex`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexSearcher;

impl ContentSearcher for RegexSearcher {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn search(&self, vault: &Vault, query: &ContentQuery) -> Result<Vec<FileMatches>> {
        let re = query.compile()?;
        let files = vault.note_files();
        debug!(files = files.len(), "regex content scan");
        Ok(scan_files(vault, files, &re, query))
    }
}

/// Asks `rg` which files match, then extracts snippets in process so both
/// searchers report identical snippets.
#[derive(Debug, Clone)]
pub struct RipgrepSearcher {
    program: PathBuf,
}

impl RipgrepSearcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `rg` from `PATH`, if present.
    pub fn detect() -> Option<Self> {
        which::which("rg").ok().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn matching_paths(&self, vault: &Vault, query: &ContentQuery) -> Result<Vec<VaultPath>> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--files-with-matches")
            .arg("--null")
            .arg("--no-ignore")
            .arg("--hidden")
            .arg("--no-messages")
            .arg("--color")
            .arg("never")
            .arg("-g")
            .arg(format!("*.{}", vault.note_extension()));
        for dir in &vault.config().ignore_dirs {
            cmd.arg("-g").arg(format!("!{dir}"));
        }
        if !query.regex {
            cmd.arg("-F");
        }
        cmd.arg(if query.is_case_sensitive() { "-s" } else { "-i" });
        cmd.arg("-e").arg(&query.query).arg(vault.root());

        let output = cmd
            .output()
            .map_err(|e| Error::Ripgrep(format!("failed to run {}: {e}", self.program.display())))?;
        match output.status.code() {
            Some(0) => {}
            Some(1) => return Ok(Vec::new()),
            _ => {
                return Err(Error::Ripgrep(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ));
            }
        }

        let mut paths: Vec<VaultPath> = output
            .stdout
            .split(|b| *b == 0)
            .filter(|raw| !raw.is_empty())
            .filter_map(|raw| {
                let abs = PathBuf::from(String::from_utf8_lossy(raw).into_owned());
                vault.to_rel(&abs).ok()
            })
            .filter(|rel| vault.is_indexable_rel(rel.as_path()) && vault.is_note_rel(rel.as_path()))
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }
}

impl ContentSearcher for RipgrepSearcher {
    fn name(&self) -> &'static str {
        "ripgrep"
    }

    fn search(&self, vault: &Vault, query: &ContentQuery) -> Result<Vec<FileMatches>> {
        let re = query.compile()?;
        let files = self.matching_paths(vault, query)?;
        debug!(files = files.len(), "ripgrep candidate files");
        Ok(scan_files(vault, files, &re, query))
    }
}

fn scan_files(
    vault: &Vault,
    files: Vec<VaultPath>,
    re: &Regex,
    query: &ContentQuery,
) -> Vec<FileMatches> {
    let mut out = Vec::new();
    for path in files {
        let abs = vault.to_abs(&path);
        let text = match read_text(&abs) {
            Ok(t) => t,
            Err(err) => {
                warn!(path = %abs.display(), error = %err, "skipping unreadable note");
                continue;
            }
        };
        let snippets = line_snippets(&text, re, query.context_lines, query.max_snippets);
        if !snippets.is_empty() {
            out.push(FileMatches { path, snippets });
        }
    }
    out
}

/// One snippet per match, in document order, up to `max` per text. Offsets
/// are in characters.
pub fn line_snippets(text: &str, re: &Regex, context: usize, max: usize) -> Vec<MatchSnippet> {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = Vec::new();
    'lines: for (ix, line) in lines.iter().enumerate() {
        for m in re.find_iter(line) {
            if out.len() >= max {
                break 'lines;
            }
            let before = lines[ix.saturating_sub(context)..ix]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let after_end = (ix + 1 + context).min(lines.len());
            let after = lines[ix + 1..after_end]
                .iter()
                .map(|s| s.to_string())
                .collect();
            out.push(MatchSnippet {
                line_no: ix + 1,
                line: line.to_string(),
                match_start: line[..m.start()].chars().count(),
                match_end: line[..m.end()].chars().count(),
                before,
                after,
            });
        }
    }
    out
}

/// The scorer and searcher a facade uses for its whole lifetime.
#[derive(Clone)]
pub struct Backends {
    pub scorer: Arc<dyn TitleScorer>,
    pub content: Arc<dyn ContentSearcher>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("scorer", &self.scorer.name())
            .field("content", &self.content.name())
            .finish()
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            scorer: Arc::new(RatioScorer),
            content: Arc::new(RegexSearcher),
        }
    }
}

impl Backends {
    pub fn from_config(cfg: &VaultConfig) -> Result<Self> {
        let scorer: Arc<dyn TitleScorer> = match cfg.scorer {
            ScorerKind::Ratio => Arc::new(RatioScorer),
            ScorerKind::Nucleo => Arc::new(NucleoScorer),
        };
        let content: Arc<dyn ContentSearcher> = match cfg.content_search {
            SearchBackendKind::Regex => Arc::new(RegexSearcher),
            SearchBackendKind::Ripgrep => Arc::new(
                RipgrepSearcher::detect()
                    .ok_or_else(|| Error::Ripgrep("`rg` not found on PATH".to_string()))?,
            ),
            SearchBackendKind::Auto => match RipgrepSearcher::detect() {
                Some(rg) => Arc::new(rg),
                None => Arc::new(RegexSearcher),
            },
        };
        debug!(scorer = scorer.name(), content = content.name(), "backends selected");
        Ok(Self { scorer, content })
    }
}
