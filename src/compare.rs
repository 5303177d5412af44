//! Unified diffs over files or text, and metadata deltas.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::fsutil::read_text;
use crate::parse::{Frontmatter, split};
use crate::{Result, Vault};

pub const DEFAULT_CONTEXT_LINES: usize = 3;

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub a_label: String,
    pub b_label: String,
    /// Empty when both sides are identical.
    pub diff_unified: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataChange {
    pub a: Value,
    pub b: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Opcode {
    tag: Tag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

/// Line matcher that recursively takes the longest common run of lines.
struct LineMatcher<'a> {
    a: Vec<&'a str>,
    b: Vec<&'a str>,
    b2j: HashMap<&'a str, Vec<usize>>,
}

impl<'a> LineMatcher<'a> {
    fn new(a: Vec<&'a str>, b: Vec<&'a str>) -> Self {
        let mut b2j: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (j, line) in b.iter().enumerate() {
            b2j.entry(*line).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    fn longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut besti, mut bestj, mut bestk) = (alo, blo, 0usize);
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(js) = self.b2j.get(self.a[i]) {
                for &j in js {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|p| j2len.get(&p))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > bestk {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestk = k;
                    }
                }
            }
            j2len = next;
        }
        (besti, bestj, bestk)
    }

    fn matching_blocks(&self) -> Vec<(usize, usize, usize)> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0usize, la, 0usize, lb)];
        let mut blocks = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            blocks.push((i, j, k));
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        blocks.sort_unstable();

        // Merge adjacent runs.
        let mut merged: Vec<(usize, usize, usize)> = Vec::with_capacity(blocks.len() + 1);
        for (i, j, k) in blocks {
            match merged.last_mut() {
                Some(last) if last.0 + last.2 == i && last.1 + last.2 == j => last.2 += k,
                _ => merged.push((i, j, k)),
            }
        }
        merged.push((la, lb, 0));
        merged
    }

    fn opcodes(&self) -> Vec<Opcode> {
        let (mut i, mut j) = (0usize, 0usize);
        let mut out = Vec::new();
        for (ai, bj, size) in self.matching_blocks() {
            let tag = match (i < ai, j < bj) {
                (true, true) => Some(Tag::Replace),
                (true, false) => Some(Tag::Delete),
                (false, true) => Some(Tag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                out.push(Opcode {
                    tag,
                    i1: i,
                    i2: ai,
                    j1: j,
                    j2: bj,
                });
            }
            i = ai + size;
            j = bj + size;
            if size > 0 {
                out.push(Opcode {
                    tag: Tag::Equal,
                    i1: ai,
                    i2: i,
                    j1: bj,
                    j2: j,
                });
            }
        }
        out
    }

    /// Change hunks with up to `n` lines of context each.
    fn grouped_opcodes(&self, n: usize) -> Vec<Vec<Opcode>> {
        let mut codes = self.opcodes();
        if codes.is_empty() {
            codes.push(Opcode {
                tag: Tag::Equal,
                i1: 0,
                i2: 1,
                j1: 0,
                j2: 1,
            });
        }
        if let Some(first) = codes.first_mut() {
            if first.tag == Tag::Equal {
                first.i1 = first.i1.max(first.i2.saturating_sub(n));
                first.j1 = first.j1.max(first.j2.saturating_sub(n));
            }
        }
        if let Some(last) = codes.last_mut() {
            if last.tag == Tag::Equal {
                last.i2 = last.i2.min(last.i1 + n);
                last.j2 = last.j2.min(last.j1 + n);
            }
        }

        let mut groups = Vec::new();
        let mut group = Vec::new();
        for mut op in codes {
            if op.tag == Tag::Equal && op.i2 - op.i1 > 2 * n {
                group.push(Opcode {
                    i2: op.i2.min(op.i1 + n),
                    j2: op.j2.min(op.j1 + n),
                    ..op
                });
                groups.push(std::mem::take(&mut group));
                op.i1 = op.i1.max(op.i2.saturating_sub(n));
                op.j1 = op.j1.max(op.j2.saturating_sub(n));
            }
            group.push(op);
        }
        if !(group.is_empty() || (group.len() == 1 && group[0].tag == Tag::Equal)) {
            groups.push(group);
        }
        groups
    }
}

/// `start,length` in the classic unified format: a single line prints only
/// its number, an empty range points at the line before it.
fn format_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    let beginning = if length == 0 { start } else { start + 1 };
    if length == 1 {
        beginning.to_string()
    } else {
        format!("{beginning},{length}")
    }
}

fn push_line(out: &mut String, prefix: char, line: &str) {
    out.push(prefix);
    out.push_str(line);
    if !line.ends_with('\n') {
        out.push('\n');
        out.push_str(NO_NEWLINE_MARKER);
    }
}

/// Standard unified diff of two texts; empty when they are identical.
pub fn unified_diff(a: &str, b: &str, a_label: &str, b_label: &str, context: usize) -> String {
    if a == b {
        return String::new();
    }
    let matcher = LineMatcher::new(
        a.split_inclusive('\n').collect(),
        b.split_inclusive('\n').collect(),
    );

    let mut out = String::new();
    for group in matcher.grouped_opcodes(context) {
        if out.is_empty() {
            out.push_str(&format!("--- {a_label}\n+++ {b_label}\n"));
        }
        let (first, last) = (group[0], group[group.len() - 1]);
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(first.i1, last.i2),
            format_range(first.j1, last.j2)
        ));
        for op in group {
            if op.tag == Tag::Equal {
                for line in &matcher.a[op.i1..op.i2] {
                    push_line(&mut out, ' ', line);
                }
                continue;
            }
            if matches!(op.tag, Tag::Replace | Tag::Delete) {
                for line in &matcher.a[op.i1..op.i2] {
                    push_line(&mut out, '-', line);
                }
            }
            if matches!(op.tag, Tag::Replace | Tag::Insert) {
                for line in &matcher.b[op.j1..op.j2] {
                    push_line(&mut out, '+', line);
                }
            }
        }
    }
    out
}

pub fn compare_text(a: &str, b: &str, a_label: &str, b_label: &str, context: usize) -> DiffResult {
    DiffResult {
        a_label: a_label.to_string(),
        b_label: b_label.to_string(),
        diff_unified: unified_diff(a, b, a_label, b_label, context),
    }
}

pub fn compare_files(vault: &Vault, a_path: &str, b_path: &str, context: usize) -> Result<DiffResult> {
    let a_abs = vault.to_abs(&vault.resolve_path(a_path)?);
    let b_abs = vault.to_abs(&vault.resolve_path(b_path)?);
    let a = read_text(&a_abs)?;
    let b = read_text(&b_abs)?;
    Ok(compare_text(
        &a,
        &b,
        &a_abs.display().to_string(),
        &b_abs.display().to_string(),
        context,
    ))
}

/// Keys whose values differ between two metadata blocks, sorted. A key
/// missing on one side is `null` there.
pub fn metadata_delta(a: &Frontmatter, b: &Frontmatter) -> BTreeMap<String, MetadataChange> {
    let a = a.to_json();
    let b = b.to_json();
    let mut out = BTreeMap::new();
    for key in a.keys().chain(b.keys()) {
        if out.contains_key(key) {
            continue;
        }
        let av = a.get(key).cloned().unwrap_or(Value::Null);
        let bv = b.get(key).cloned().unwrap_or(Value::Null);
        if av != bv {
            out.insert(key.clone(), MetadataChange { a: av, b: bv });
        }
    }
    out
}

pub fn compare_metadata(
    vault: &Vault,
    a_path: &str,
    b_path: &str,
) -> Result<BTreeMap<String, MetadataChange>> {
    let format = vault.config().metadata_format;
    let a = read_text(&vault.to_abs(&vault.resolve_path(a_path)?))?;
    let b = read_text(&vault.to_abs(&vault.resolve_path(b_path)?))?;
    Ok(metadata_delta(
        &split(&a, format).frontmatter,
        &split(&b, format).frontmatter,
    ))
}
