use camino::Utf8PathBuf;
use velox_cache::CacheError;
use velox_proto::ErrorKind;
use velox_tarball::TarballError;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    // === Fetch Errors ===
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid URL {url}: {message}")]
    Url { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty body")]
    EmptyBody { url: String },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    // === Module Path Errors ===
    #[error("module path {module:?} is not of the form host/owner/repo[/...]")]
    InvalidModulePath { module: String },

    #[error("no source host client for {host}")]
    UnsupportedHost { host: String },

    // === Archive Errors ===
    #[error("failed to extract server archive for {reference}: {source}")]
    Extract {
        reference: String,
        #[source]
        source: TarballError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HostError::Client(_)
            | HostError::Url { .. }
            | HostError::Request { .. }
            | HostError::Status { .. }
            | HostError::EmptyBody { .. }
            | HostError::Decode { .. } => ErrorKind::FetchFailed,
            HostError::InvalidModulePath { .. } => ErrorKind::ResolveFailed,
            HostError::UnsupportedHost { .. } => ErrorKind::UnsupportedHost,
            HostError::Extract { source, .. } => source.kind(),
            HostError::Cache(e) => e.kind(),
            HostError::Io { .. } => ErrorKind::IoFailed,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            HostError::Status { status, .. } => Some(*status),
            HostError::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;
