//! Plugin resolution.
//!
//! Turns each [`PluginRequest`] into a [`ResolvedModule`]: the module path
//! declared by the plugin's own `go.mod` plus a version the Go toolchain
//! accepts. Tags and `latest` are used as-is; branches and commits become
//! pseudo-versions built from the head commit.

mod pool;
mod version;


pub use pool::{QUEUE_CAPACITY, ResolverPool, WORKERS, resolve_all};
pub use version::{VersionDescriptor, is_version_tag, major_of, pseudo_version};

use velox_host::HostError;
use velox_proto::ErrorKind;

/// Characters of the commit SHA kept in a pseudo-version
pub const SHORT_SHA_LEN: usize = 12;

/// A plugin as the user declared it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    /// Display name, used in error reports
    pub name: String,
    /// Go module path
    pub module: String,
    /// Tag, branch, commit SHA or `latest`
    pub reference: String,
    pub replace: Option<String>,
}

impl PluginRequest {
    pub fn new(module: impl Into<String>, reference: impl Into<String>) -> Self {
        let module = module.into();
        Self {
            name: module.clone(),
            module,
            reference: reference.into(),
            replace: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_replace(mut self, replace: Option<String>) -> Self {
        self.replace = replace.filter(|r| !r.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub name: String,
    /// Module path as declared by the plugin's `go.mod`
    pub module: String,
    pub version: VersionDescriptor,
    pub replace: Option<String>,
}

/// Why one plugin failed to resolve
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("empty reference")]
    EmptyReference,

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("go.mod is not valid UTF-8")]
    ManifestNotUtf8,

    #[error("go.mod has no module declaration")]
    MissingModuleLine,

    #[error("malformed module declaration {line:?}")]
    MalformedModuleLine { line: String },

    #[error("no commits found for reference {reference}")]
    NoCommits { reference: String },

    #[error("resolver pool is shut down")]
    PoolClosed,

    #[error("resolver worker stopped before finishing")]
    WorkerLost,

    #[error("commit SHA {sha:?} is shorter than 12 characters")]
    ShortSha { sha: String },
}

impl PluginError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PluginError::Host(e) => match e.kind() {
                ErrorKind::UnsupportedHost => ErrorKind::UnsupportedHost,
                ErrorKind::FetchFailed => ErrorKind::FetchFailed,
                _ => ErrorKind::ResolveFailed,
            },
            _ => ErrorKind::ResolveFailed,
        }
    }
}

#[derive(Debug)]
pub struct PluginFailure {
    pub plugin: String,
    pub cause: PluginError,
}

impl std::fmt::Display for PluginFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.plugin, self.cause)
    }
}

/// Every per-plugin failure of one resolution run
#[derive(Debug)]
pub struct ResolveError {
    pub failures: Vec<PluginFailure>,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to resolve {} plugin(s)", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolveError {}

impl ResolveError {
    /// `UnsupportedHost` if any plugin lives on a host without a client,
    /// otherwise `ResolveFailed`.
    pub fn kind(&self) -> ErrorKind {
        if self
            .failures
            .iter()
            .any(|f| f.cause.kind() == ErrorKind::UnsupportedHost)
        {
            ErrorKind::UnsupportedHost
        } else {
            ErrorKind::ResolveFailed
        }
    }

    pub fn failed_plugins(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.plugin.as_str()).collect()
    }
}

/// Extract the module path from a `go.mod`.
///
/// The first line starting with `module` must split into exactly two
/// whitespace-separated tokens. A quoted path is unquoted.
pub fn parse_module_line(manifest: &str) -> Result<String, PluginError> {
    let line = manifest
        .lines()
        .map(str::trim)
        .find(|line| line.split_whitespace().next() == Some("module"))
        .ok_or(PluginError::MissingModuleLine)?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() != 2 {
        return Err(PluginError::MalformedModuleLine {
            line: line.to_string(),
        });
    }

    Ok(tokens[1].trim_matches('"').to_string())
}
