use std::path::PathBuf;

use cast_vault::{
    BundleRequest, CancelToken, CastApi, CreateNote, Envelope, Frontmatter, GrepOptions,
    RenameRequest, ReplaceRequest, Strategy, VaultConfig,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Title,
    Content,
    Hybrid,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Title => Strategy::Title,
            StrategyArg::Content => Strategy::Content,
            StrategyArg::Hybrid => Strategy::Hybrid,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "cast", version, about = "Markdown vault search and editing CLI")]
struct Cli {
    /// Path to the vault root.
    #[arg(long, env = "CAST_VAULT", global = true)]
    vault: Option<PathBuf>,

    /// TOML file overriding the default vault settings.
    #[arg(long, env = "CAST_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fuzzy search over note titles.
    Titles {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Minimum score (0-100); defaults to the configured threshold.
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Literal or pattern search over note contents.
    Grep {
        query: String,
        /// Treat the query as a regular expression.
        #[arg(long)]
        regex: bool,
        /// Force case-sensitive matching (default: smart case).
        #[arg(long, conflicts_with = "ignore_case")]
        case_sensitive: bool,
        /// Force case-insensitive matching.
        #[arg(long)]
        ignore_case: bool,
        /// Lines of context around each match.
        #[arg(long, default_value_t = 0)]
        context: usize,
        #[arg(long, default_value_t = 2000)]
        limit: usize,
    },
    /// Title and content search, fused by path.
    Search {
        query: String,
        #[arg(long, default_value_t = 25)]
        limit: usize,
    },
    /// Read a note by title or path.
    Read { note: String },
    /// Scan the vault and print every note's metadata.
    Index,
    /// Create a note with metadata and footer sections.
    Create {
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        /// Read the content from a file instead.
        #[arg(long, conflicts_with = "content")]
        content_file: Option<PathBuf>,
        /// Dependency title (repeatable).
        #[arg(long = "dep")]
        dependencies: Vec<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "type")]
        note_type: Option<String>,
        #[arg(long)]
        base_version: Option<i64>,
        /// Tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        overwrite: bool,
    },
    /// Search and replace across notes. Previews unless --apply is given.
    Replace {
        find: String,
        replace: String,
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        ignore_case: bool,
        /// Glob over vault-relative paths.
        #[arg(long, default_value = "**/*.md")]
        include: String,
        /// Explicit vault-relative path (repeatable); overrides --include.
        #[arg(long = "path")]
        paths: Vec<String>,
        /// Write the changes.
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        max_files: Option<usize>,
    },
    /// Rename a note and rewrite links pointing at it.
    Rename {
        old: String,
        new: String,
        /// Only rename the file.
        #[arg(long)]
        no_links: bool,
        #[arg(long, default_value = "**/*.md")]
        include: String,
    },
    /// Unified diff of two vault files.
    DiffFiles {
        a: String,
        b: String,
        #[arg(long, default_value_t = 3)]
        context: usize,
    },
    /// Unified diff of two strings.
    DiffText {
        a: String,
        b: String,
        #[arg(long, default_value = "a")]
        a_label: String,
        #[arg(long, default_value = "b")]
        b_label: String,
        #[arg(long, default_value_t = 3)]
        context: usize,
    },
    /// Metadata keys that differ between two vault files.
    DiffMeta { a: String, b: String },
    /// Structural checks of a note.
    Validate { note: String },
    /// Search hits expanded with note content and dependencies.
    Bundle {
        query: String,
        #[arg(long, value_enum, default_value = "hybrid")]
        strategy: StrategyArg,
        #[arg(long, default_value_t = 8)]
        top_k: usize,
        #[arg(long)]
        no_deps: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => VaultConfig::load(path)?,
        None => VaultConfig::default(),
    };
    let api = CastApi::new(cfg)?;

    let envelope = run(&api, cli.vault, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if !envelope.ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(api: &CastApi, vault: Option<PathBuf>, command: Command) -> anyhow::Result<Envelope> {
    let root = || require_vault(vault.clone());
    let envelope = match command {
        Command::Titles {
            query,
            limit,
            threshold,
        } => {
            api.search_titles_fuzzy(root()?, &query, Some(limit), threshold)
                .await
        }
        Command::Grep {
            query,
            regex,
            case_sensitive,
            ignore_case,
            context,
            limit,
        } => {
            let case_sensitive = match (case_sensitive, ignore_case) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let opts = GrepOptions {
                query,
                regex,
                case_sensitive,
                context_lines: context,
                limit,
            };
            api.grep(root()?, opts).await
        }
        Command::Search { query, limit } => api.search_all(root()?, &query, Some(limit)).await,
        Command::Read { note } => api.read_note(root()?, &note).await,
        Command::Index => api.build_index(root()?).await,
        Command::Create {
            title,
            content,
            content_file,
            dependencies,
            category,
            note_type,
            base_version,
            tags,
            overwrite,
        } => {
            let content = match content_file {
                Some(path) => std::fs::read_to_string(&path)?,
                None => content,
            };
            let overrides = Frontmatter {
                category,
                note_type,
                base_version,
                tags: if tags.is_empty() { None } else { Some(tags) },
                ..Default::default()
            };
            let req = CreateNote {
                title,
                content,
                frontmatter: Some(overrides),
                dependencies,
                overwrite,
            };
            api.create_note(root()?, req).await
        }
        Command::Replace {
            find,
            replace,
            regex,
            ignore_case,
            include,
            paths,
            apply,
            max_files,
        } => {
            let req = ReplaceRequest {
                find,
                replace,
                regex,
                case_sensitive: ignore_case.then_some(false),
                include_pattern: include,
                paths,
                dry_run: !apply,
                max_files,
            };
            api.search_replace(root()?, req, CancelToken::new()).await
        }
        Command::Rename {
            old,
            new,
            no_links,
            include,
        } => {
            let req = RenameRequest {
                old_title: old,
                new_title: new,
                update_links: !no_links,
                include_pattern: include,
            };
            api.rename_title(root()?, req, CancelToken::new()).await
        }
        Command::DiffFiles { a, b, context } => {
            api.compare_files(root()?, &a, &b, Some(context)).await
        }
        Command::DiffMeta { a, b } => api.compare_metadata(root()?, &a, &b).await,
        Command::Validate { note } => api.validate_note(root()?, &note).await,
        Command::Bundle {
            query,
            strategy,
            top_k,
            no_deps,
        } => {
            let req = BundleRequest {
                query,
                strategy: strategy.into(),
                top_k,
                include_dependencies: !no_deps,
            };
            api.context_bundle(root()?, req).await
        }
        Command::DiffText {
            a,
            b,
            a_label,
            b_label,
            context,
        } => {
            api.compare_text(&a, &b, &a_label, &b_label, Some(context))
                .await
        }
    };
    Ok(envelope)
}

fn require_vault(vault: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    vault.ok_or_else(|| anyhow::anyhow!("--vault is required (or set CAST_VAULT)"))
}
