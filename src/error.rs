use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("vault root does not exist: {0}")]
    VaultNotFound(PathBuf),

    #[error("invalid vault path: {0}")]
    InvalidVaultPath(String),

    #[error("path is outside vault: {0}")]
    PathOutsideVault(PathBuf),

    #[error("not found: {0}")]
    NotFound(PathBuf),

    #[error("target exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("invalid title: {0:?}")]
    InvalidTitle(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid include pattern: {0}")]
    InvalidGlob(#[from] globset::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frontmatter yaml error: {0}")]
    FrontmatterYaml(#[from] serde_yaml::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("ripgrep failed: {0}")]
    Ripgrep(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Coarse classification used by the API envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Io => "io",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(path);
        }
        Self::Io { path, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::VaultNotFound(_) | Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::InvalidVaultPath(_)
            | Error::PathOutsideVault(_)
            | Error::InvalidTitle(_)
            | Error::InvalidInput(_)
            | Error::InvalidPattern(_)
            | Error::InvalidGlob(_)
            | Error::Config(_) => ErrorKind::InvalidInput,
            Error::Io { .. } | Error::Ripgrep(_) => ErrorKind::Io,
            Error::FrontmatterYaml(_) | Error::Json(_) | Error::Task(_) => ErrorKind::Internal,
        }
    }
}
