//! velox protocol definitions
//!
//! The build service takes a RoadRunner server reference plus a list of
//! plugins and produces a custom `rr` binary. This crate holds everything
//! both sides of the wire agree on:
//! - request and response shapes
//! - the error taxonomy and its mapping onto wire status codes
//! - the `BuildService` rapace trait

use facet::Facet;

/// Bumped whenever a request or response shape changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Target platform in Go naming (`linux`/`amd64`, `darwin`/`arm64`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

/// One plugin to compile into the server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
pub struct PluginSpec {
    /// Go module path, e.g. `github.com/roadrunner-server/logger/v5`
    pub module_name: String,
    /// Tag, branch, commit SHA or `latest`
    pub tag: String,
    /// Local path or module substituted for `module_name`
    pub replace: Option<String>,
}

impl PluginSpec {
    pub fn new(module_name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            tag: tag.into(),
            replace: None,
        }
    }

    pub fn with_replace(mut self, replace: impl Into<String>) -> Self {
        self.replace = Some(replace.into());
        self
    }
}

/// Request to build a server binary
#[derive(Debug, Clone, Facet)]
pub struct BuildRequest {
    /// Correlation id, echoed in logs. Not part of the fingerprint.
    pub request_id: String,
    /// RoadRunner server reference: `master`, a tag, a branch or a commit SHA
    pub server_ref: String,
    /// Plugins, in registration order
    pub plugins: Vec<PluginSpec>,
    /// Target platform; host platform when absent
    pub target_platform: Option<Platform>,
    /// Rebuild even if a cached binary exists
    pub force_rebuild: bool,
}

/// Wire status of a build response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    AlreadyExists,
    Internal,
    Unimplemented,
}

/// Result of a build
#[derive(Debug, Clone, Facet)]
pub struct BuildResponse {
    pub code: StatusCode,
    /// Absolute path of the produced binary (on success)
    pub path: Option<String>,
    /// Captured toolchain output; empty for cache hits
    pub logs: String,
    /// Whether the binary came from the build cache
    pub cached: bool,
    /// Human-readable status or error message
    pub message: String,
}

impl BuildResponse {
    pub fn success(path: String, logs: String, cached: bool) -> Self {
        Self {
            code: StatusCode::Ok,
            path: Some(path),
            logs,
            cached,
            message: String::new(),
        }
    }

    pub fn failure(kind: ErrorKind, message: String) -> Self {
        Self {
            code: kind.status_code(),
            path: None,
            logs: String::new(),
            cached: false,
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// Service identification returned by `BuildService::version`
#[derive(Debug, Clone, Facet)]
pub struct ServiceVersion {
    pub service: String,
    pub version: String,
    pub protocol_version: u32,
}

/// Classification shared by every velox error type.
///
/// Callers match on the kind, never on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum ErrorKind {
    InvalidConfig,
    InvalidServerReference,
    UnknownVariant,
    NoPluginsConfigured,
    ResolveFailed,
    FetchFailed,
    ExtractFailed,
    ToolchainFailed,
    IoFailed,
    AlreadyInProgress,
    CacheInconsistent,
    UnsupportedHost,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::InvalidConfig
            | ErrorKind::InvalidServerReference
            | ErrorKind::UnknownVariant
            | ErrorKind::NoPluginsConfigured => StatusCode::InvalidArgument,
            ErrorKind::AlreadyInProgress => StatusCode::AlreadyExists,
            ErrorKind::UnsupportedHost => StatusCode::Unimplemented,
            ErrorKind::ResolveFailed
            | ErrorKind::FetchFailed
            | ErrorKind::ExtractFailed
            | ErrorKind::ToolchainFailed
            | ErrorKind::IoFailed
            | ErrorKind::CacheInconsistent => StatusCode::Internal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "invalid config",
            ErrorKind::InvalidServerReference => "invalid server reference",
            ErrorKind::UnknownVariant => "unknown variant",
            ErrorKind::NoPluginsConfigured => "no plugins configured",
            ErrorKind::ResolveFailed => "resolve failed",
            ErrorKind::FetchFailed => "fetch failed",
            ErrorKind::ExtractFailed => "extract failed",
            ErrorKind::ToolchainFailed => "toolchain failed",
            ErrorKind::IoFailed => "i/o failed",
            ErrorKind::AlreadyInProgress => "already in progress",
            ErrorKind::CacheInconsistent => "cache inconsistent",
            ErrorKind::UnsupportedHost => "unsupported host",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The build service trait
#[rapace::service]
pub trait BuildService {
    /// Build (or fetch from cache) a server binary
    async fn build(&self, request: BuildRequest) -> BuildResponse;

    /// Service name and version
    async fn version(&self) -> ServiceVersion;
}
