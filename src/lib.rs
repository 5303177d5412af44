mod api;
mod backend;
mod compare;
mod config;
mod edit;
mod error;
mod fsutil;
mod index;
mod note;
pub mod parse;
mod search;
mod vault;

pub use crate::api::{BundleItem, BundleRequest, CastApi, Envelope, Strategy};
pub use crate::backend::{
    Backends, ContentQuery, ContentSearcher, FileMatches, NucleoScorer, RatioScorer,
    RegexSearcher, RipgrepSearcher, TitleScorer, line_snippets,
};
pub use crate::compare::{
    DEFAULT_CONTEXT_LINES, DiffResult, MetadataChange, compare_files, compare_metadata,
    compare_text, metadata_delta, unified_diff,
};
pub use crate::config::{MetadataFormat, ScorerKind, SearchBackendKind, VaultConfig};
pub use crate::edit::{
    CancelToken, CreateNote, CreateReport, DEFAULT_INCLUDE_PATTERN, FileChange, FileFailure,
    LinkUpdate, RenameReport, RenameRequest, ReplaceReport, ReplaceRequest, create_note,
    rename_title, rewrite_link_targets, search_replace,
};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::fsutil::{TIMESTAMP_FORMAT, atomic_write, backup_path, now_timestamp, read_text};
pub use crate::index::{NoteMeta, SkippedFile, TitleConflict, VaultIndex};
pub use crate::note::{
    FORBIDDEN_TITLE_CHARS, NoteDocument, ValidationIssue, ValidationReport, build_new_note,
    ensure_footer, main_content, normalize_title, read_note, touch_last_updated, validate,
    validate_note,
};
pub use crate::parse::{Frontmatter, FrontmatterStatus, Wikilink};
pub use crate::search::{
    DEFAULT_GREP_LIMIT, DEFAULT_HYBRID_LIMIT, DEFAULT_TITLE_LIMIT, GrepOptions, MatchReason,
    MatchSnippet, SearchHit, content_score, fuzzy_title_search, grep, hybrid_search,
};
pub use crate::vault::{Vault, VaultPath};
