use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::{MetadataFormat, Result};

pub const FENCE: &str = "---";

pub const KEY_LAST_UPDATED: &str = "last-updated";
pub const KEY_CATEGORY: &str = "category";
pub const KEY_TYPE: &str = "type";
pub const KEY_BASE_VERSION: &str = "base-version";
pub const KEY_TAGS: &str = "tags";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontmatterStatus {
    None,
    Valid,
    Broken { error: String },
}

/// The metadata block at the top of a note.
///
/// Recognized keys are typed; everything else is kept in `extra` in source
/// order. A recognized key whose value has an unusable type also lands in
/// `extra`, unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub last_updated: Option<String>,
    pub category: Option<String>,
    pub note_type: Option<String>,
    pub base_version: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub extra: Mapping,
}

#[derive(Debug, Clone)]
pub struct SplitNote<'a> {
    pub frontmatter: Frontmatter,
    pub status: FrontmatterStatus,
    pub body: &'a str,
    /// Byte range of the block's inner text within the raw input.
    pub block: Option<Range<usize>>,
}

impl Frontmatter {
    pub fn is_empty(&self) -> bool {
        self.last_updated.is_none()
            && self.category.is_none()
            && self.note_type.is_none()
            && self.base_version.is_none()
            && self.tags.is_none()
            && self.extra.is_empty()
    }

    pub fn from_mapping(map: Mapping) -> Self {
        let mut fm = Self::default();
        for (k, v) in map {
            let Some(key) = scalar_string(&k) else {
                continue;
            };
            match key.as_str() {
                KEY_LAST_UPDATED => match scalar_string(&v) {
                    Some(s) => fm.last_updated = Some(s),
                    None => insert_extra(&mut fm.extra, key, v),
                },
                KEY_CATEGORY => match scalar_string(&v) {
                    Some(s) => fm.category = Some(s),
                    None => insert_extra(&mut fm.extra, key, v),
                },
                KEY_TYPE => match scalar_string(&v) {
                    Some(s) => fm.note_type = Some(s),
                    None => insert_extra(&mut fm.extra, key, v),
                },
                KEY_BASE_VERSION => match integer(&v) {
                    Some(n) => fm.base_version = Some(n),
                    None => insert_extra(&mut fm.extra, key, v),
                },
                KEY_TAGS => match tags_from_value(&v) {
                    Some(tags) => fm.tags = Some(tags),
                    None => insert_extra(&mut fm.extra, key, v),
                },
                _ => insert_extra(&mut fm.extra, key, v),
            }
        }
        fm
    }

    /// Canonical key order: last-updated, tags, category, type, base-version,
    /// then unknown keys as they appeared.
    pub fn to_mapping(&self) -> Mapping {
        let mut map = Mapping::new();
        if let Some(v) = &self.last_updated {
            map.insert(KEY_LAST_UPDATED.into(), Value::String(v.clone()));
        }
        if let Some(tags) = &self.tags {
            map.insert(
                KEY_TAGS.into(),
                Value::Sequence(tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(v) = &self.category {
            map.insert(KEY_CATEGORY.into(), Value::String(v.clone()));
        }
        if let Some(v) = &self.note_type {
            map.insert(KEY_TYPE.into(), Value::String(v.clone()));
        }
        if let Some(v) = self.base_version {
            map.insert(KEY_BASE_VERSION.into(), Value::Number(v.into()));
        }
        for (k, v) in &self.extra {
            if !map.contains_key(k) {
                map.insert(k.clone(), v.clone());
            }
        }
        map
    }

    /// Overlays every field set in `other` onto `self`.
    pub fn merge(&mut self, other: Frontmatter) {
        if other.last_updated.is_some() {
            self.last_updated = other.last_updated;
        }
        if other.category.is_some() {
            self.category = other.category;
        }
        if other.note_type.is_some() {
            self.note_type = other.note_type;
        }
        if other.base_version.is_some() {
            self.base_version = other.base_version;
        }
        if other.tags.is_some() {
            self.tags = other.tags;
        }
        for (k, v) in other.extra {
            self.extra.insert(k, v);
        }
    }

    /// `---` fenced YAML text, including the trailing newline.
    pub fn render(&self) -> Result<String> {
        let map = self.to_mapping();
        let mut out = String::from(FENCE);
        out.push('\n');
        if !map.is_empty() {
            out.push_str(&serde_yaml::to_string(&map)?);
        }
        out.push_str(FENCE);
        out.push('\n');
        Ok(out)
    }

    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self.to_mapping()) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

impl Serialize for Frontmatter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Frontmatter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Self::default()),
            Value::Mapping(map) => Ok(Self::from_mapping(map)),
            _ => Err(serde::de::Error::custom("metadata must be a mapping")),
        }
    }
}

/// Splits a note into its metadata block and body. Never fails: a missing,
/// unclosed or unparsable block yields empty metadata.
pub fn split(raw: &str, format: MetadataFormat) -> SplitNote<'_> {
    let offset = if raw.starts_with('\u{feff}') {
        '\u{feff}'.len_utf8()
    } else {
        0
    };
    let content = &raw[offset..];

    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return SplitNote {
            frontmatter: Frontmatter::default(),
            status: FrontmatterStatus::None,
            body: content,
            block: None,
        };
    };
    let rest_start = offset + (content.len() - rest.len());

    let mut idx = 0usize;
    let bytes = rest.as_bytes();
    while idx < bytes.len() {
        let line_end = match bytes[idx..].iter().position(|b| *b == b'\n') {
            Some(off) => idx + off + 1,
            None => bytes.len(),
        };
        let line = rest[idx..line_end].trim_end_matches(['\r', '\n']);
        if line == FENCE {
            let block_text = &rest[..idx];
            let body = &rest[line_end..];
            let (frontmatter, status) = parse_block(block_text, format);
            return SplitNote {
                frontmatter,
                status,
                body,
                block: Some(rest_start..rest_start + idx),
            };
        }
        idx = line_end;
    }

    SplitNote {
        frontmatter: Frontmatter::default(),
        status: FrontmatterStatus::Broken {
            error: "metadata fence not closed".to_string(),
        },
        body: content,
        block: None,
    }
}

fn parse_block(text: &str, format: MetadataFormat) -> (Frontmatter, FrontmatterStatus) {
    match format {
        MetadataFormat::Minimal => (
            Frontmatter::from_mapping(parse_minimal(text)),
            FrontmatterStatus::Valid,
        ),
        MetadataFormat::Yaml => match serde_yaml::from_str::<Value>(text) {
            Ok(Value::Null) => (Frontmatter::default(), FrontmatterStatus::Valid),
            Ok(Value::Mapping(map)) => (Frontmatter::from_mapping(map), FrontmatterStatus::Valid),
            Ok(_) => (
                Frontmatter::default(),
                FrontmatterStatus::Broken {
                    error: "metadata block is not a mapping".to_string(),
                },
            ),
            Err(err) => (
                Frontmatter::default(),
                FrontmatterStatus::Broken {
                    error: err.to_string(),
                },
            ),
        },
    }
}

/// Line-oriented fallback parser: `key: value`, integers, and `key:`
/// followed by `- item` lines. Anything else is ignored.
pub fn parse_minimal(text: &str) -> Mapping {
    let mut map = Mapping::new();
    let mut key: Option<Value> = None;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let trimmed = line.trim_start();
        if let Some(item) = trimmed.strip_prefix('-') {
            let Some(k) = &key else {
                continue;
            };
            let item = Value::String(item.trim().to_string());
            match map.get_mut(k) {
                Some(Value::Sequence(seq)) => seq.push(item),
                Some(other) => {
                    let old = std::mem::replace(other, Value::Null);
                    *other = Value::Sequence(vec![old, item]);
                }
                None => {
                    map.insert(k.clone(), Value::Sequence(vec![item]));
                }
            }
        } else if let Some((k, v)) = line.split_once(':') {
            let k = Value::String(k.trim().to_string());
            let v = v.trim();
            let value = if v.is_empty() {
                Value::Sequence(Vec::new())
            } else if let Ok(n) = v.parse::<i64>() {
                Value::Number(n.into())
            } else {
                Value::String(v.to_string())
            };
            map.insert(k.clone(), value);
            key = Some(k);
        }
    }
    map
}

/// Rewrites (or inserts) the `last-updated` line of an existing, valid
/// metadata block. Every other byte of `raw` is preserved. Returns `None`
/// when there is no valid block to update.
pub fn set_last_updated(raw: &str, stamp: &str, format: MetadataFormat) -> Option<String> {
    let parsed = split(raw, format);
    if parsed.status != FrontmatterStatus::Valid {
        return None;
    }
    let block = parsed.block?;
    let replacement = format!("{KEY_LAST_UPDATED}: {stamp}");

    let mut pos = block.start;
    while pos < block.end {
        let line_end = raw[pos..block.end]
            .find('\n')
            .map(|off| pos + off)
            .unwrap_or(block.end);
        let line = raw[pos..line_end].trim_end_matches('\r');
        if let Some(after) = line.strip_prefix(KEY_LAST_UPDATED) {
            if after.trim_start().starts_with(':') {
                let mut out = String::with_capacity(raw.len() + stamp.len());
                out.push_str(&raw[..pos]);
                out.push_str(&replacement);
                out.push_str(&raw[pos + line.len()..]);
                return Some(out);
            }
        }
        pos = line_end + 1;
    }

    let mut out = String::with_capacity(raw.len() + replacement.len() + 1);
    out.push_str(&raw[..block.start]);
    out.push_str(&replacement);
    out.push('\n');
    out.push_str(&raw[block.start..]);
    Some(out)
}

fn insert_extra(extra: &mut Mapping, key: String, value: Value) {
    extra.insert(Value::String(key), value);
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        _ => None,
    }
}

fn integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn tags_from_value(v: &Value) -> Option<Vec<String>> {
    match v {
        Value::Null => Some(Vec::new()),
        Value::Sequence(seq) => Some(
            seq.iter()
                .filter_map(scalar_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(|c: char| c.is_whitespace() || c == ',')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(raw: &str) -> SplitNote<'_> {
        split(raw, MetadataFormat::Yaml)
    }

    #[test]
    fn recognized_keys_are_typed_and_unknown_keys_kept_in_order() {
        let raw = "---\nzeta: 1\ncategory: artifact\nbase-version: 3\ntags: [a, b]\nalpha: x\n---\nBody\n";
        let parsed = yaml(raw);
        assert_eq!(parsed.status, FrontmatterStatus::Valid);
        assert_eq!(parsed.body, "Body\n");
        let fm = parsed.frontmatter;
        assert_eq!(fm.category.as_deref(), Some("artifact"));
        assert_eq!(fm.base_version, Some(3));
        assert_eq!(fm.tags, Some(vec!["a".to_string(), "b".to_string()]));
        let extra_keys: Vec<_> = fm.extra.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(extra_keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn missing_or_broken_blocks_degrade_to_empty_metadata() {
        let parsed = yaml("no block here\n");
        assert_eq!(parsed.status, FrontmatterStatus::None);
        assert_eq!(parsed.body, "no block here\n");

        let parsed = yaml("---\nkey: value\nno closing fence\n");
        assert!(matches!(parsed.status, FrontmatterStatus::Broken { .. }));
        assert!(parsed.frontmatter.is_empty());
        assert!(parsed.body.starts_with("---\n"));

        let parsed = yaml("---\nkey: [unclosed\n---\nBody\n");
        assert!(matches!(parsed.status, FrontmatterStatus::Broken { .. }));
        assert_eq!(parsed.body, "Body\n");

        let parsed = yaml("---\n- a list\n---\nBody\n");
        assert!(matches!(parsed.status, FrontmatterStatus::Broken { .. }));
    }

    #[test]
    fn bom_and_crlf_are_tolerated() {
        let parsed = yaml("\u{feff}---\r\ncategory: x\r\n---\r\nBody\r\n");
        assert_eq!(parsed.status, FrontmatterStatus::Valid);
        assert_eq!(parsed.frontmatter.category.as_deref(), Some("x"));
        assert_eq!(parsed.body, "Body\r\n");
    }

    #[test]
    fn mistyped_recognized_keys_are_preserved_in_extra() {
        let parsed = yaml("---\nbase-version: draft\ncategory: {a: 1}\n---\n");
        let fm = parsed.frontmatter;
        assert_eq!(fm.base_version, None);
        assert_eq!(fm.category, None);
        assert!(fm.extra.contains_key("base-version"));
        assert!(fm.extra.contains_key("category"));
    }

    #[test]
    fn minimal_parser_handles_scalars_ints_and_lists() {
        let parsed = split(
            "---\nlast-updated: 2024-01-02 03:04\nbase-version: 2\ntags:\n- one\n- two\nbroken line\n---\nBody",
            MetadataFormat::Minimal,
        );
        let fm = parsed.frontmatter;
        assert_eq!(fm.last_updated.as_deref(), Some("2024-01-02 03:04"));
        assert_eq!(fm.base_version, Some(2));
        assert_eq!(fm.tags, Some(vec!["one".to_string(), "two".to_string()]));
        assert_eq!(parsed.body, "Body");
    }

    #[test]
    fn render_round_trips_through_split() {
        let mut fm = Frontmatter {
            last_updated: Some("2024-01-02 03:04".into()),
            category: Some("artifact".into()),
            note_type: Some("note".into()),
            base_version: Some(1),
            tags: Some(vec!["demo".into()]),
            extra: Mapping::new(),
        };
        fm.extra.insert("owner".into(), "sam".into());
        let text = format!("{}Body\n", fm.render().unwrap());
        assert!(text.starts_with("---\nlast-updated:"));

        let parsed = yaml(&text);
        assert_eq!(parsed.status, FrontmatterStatus::Valid);
        assert_eq!(parsed.frontmatter, fm);
        assert_eq!(parsed.body, "Body\n");
    }

    #[test]
    fn merge_overrides_only_set_fields() {
        let mut base = Frontmatter {
            category: Some("artifact".into()),
            note_type: Some("note".into()),
            ..Default::default()
        };
        let overrides: Frontmatter =
            serde_json::from_value(serde_json::json!({"category": "test", "owner": "sam"})).unwrap();
        base.merge(overrides);
        assert_eq!(base.category.as_deref(), Some("test"));
        assert_eq!(base.note_type.as_deref(), Some("note"));
        assert_eq!(base.extra.get("owner"), Some(&Value::String("sam".into())));
    }

    #[test]
    fn set_last_updated_rewrites_only_that_line() {
        let raw = "---\ncategory: a\nlast-updated: 2020-01-01 00:00\nowner:   spaced\n---\nBody\n";
        let out = set_last_updated(raw, "2030-05-06 07:08", MetadataFormat::Yaml).unwrap();
        assert_eq!(
            out,
            "---\ncategory: a\nlast-updated: 2030-05-06 07:08\nowner:   spaced\n---\nBody\n"
        );

        let raw = "---\ncategory: a\n---\nBody\n";
        let out = set_last_updated(raw, "2030-05-06 07:08", MetadataFormat::Yaml).unwrap();
        assert_eq!(out, "---\nlast-updated: 2030-05-06 07:08\ncategory: a\n---\nBody\n");

        assert!(set_last_updated("Body only\n", "x", MetadataFormat::Yaml).is_none());
    }
}
