pub mod frontmatter;
pub mod markdown;

pub use frontmatter::{Frontmatter, FrontmatterStatus, SplitNote, set_last_updated, split};
pub use markdown::{
    DEPENDENCIES_HEADING, END_HEADING, SEPARATOR_LINE, Wikilink, dependencies, extract_links,
    wikilinks,
};
