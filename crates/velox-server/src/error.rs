use velox_builder::BuildError;
use velox_cache::Fingerprint;
use velox_host::HostError;
use velox_proto::{ErrorKind, StatusCode};
use velox_resolver::ResolveError;
use velox_template::TemplateError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("invalid request: {source}")]
    InvalidServerRef {
        #[source]
        source: TemplateError,
    },

    #[error("no plugins configured")]
    NoPluginsConfigured,

    #[error("build {fingerprint} is already in progress")]
    AlreadyInProgress { fingerprint: Fingerprint },

    #[error("build {fingerprint}: failed to fetch server {server_ref}: {source}")]
    Template {
        fingerprint: Fingerprint,
        server_ref: String,
        #[source]
        source: HostError,
    },

    #[error("build {fingerprint}: {source}")]
    Resolve {
        fingerprint: Fingerprint,
        #[source]
        source: ResolveError,
    },

    #[error("build {fingerprint} of server {server_ref} failed: {source}")]
    Build {
        fingerprint: Fingerprint,
        server_ref: String,
        #[source]
        source: BuildError,
        /// Toolchain output captured before the failure
        log: String,
    },
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::InvalidRequest { .. } => ErrorKind::InvalidConfig,
            ServerError::InvalidServerRef { source } => source.kind(),
            ServerError::NoPluginsConfigured => ErrorKind::NoPluginsConfigured,
            ServerError::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            ServerError::Template { source, .. } => match source.kind() {
                kind if kind.status_code() == StatusCode::Internal => kind,
                _ => ErrorKind::FetchFailed,
            },
            ServerError::Resolve { source, .. } => source.kind(),
            // anything past validation is a pipeline failure
            ServerError::Build { source, .. } => match source.kind() {
                kind if kind.status_code() == StatusCode::Internal => kind,
                _ => ErrorKind::ToolchainFailed,
            },
        }
    }

    /// Toolchain output to hand back with the failure, if any
    pub fn log(&self) -> &str {
        match self {
            ServerError::Build { log, .. } => log,
            _ => "",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use velox_cache::fingerprint;
    use velox_proto::{BuildRequest, PluginSpec};

    use super::*;

    fn fp() -> Fingerprint {
        fingerprint(&BuildRequest {
            request_id: String::new(),
            server_ref: "v2025.1.0".to_string(),
            plugins: vec![PluginSpec::new("github.com/roadrunner-server/logger/v5", "v5.1.8")],
            target_platform: None,
            force_rebuild: false,
        })
    }

    #[test]
    fn template_failures_are_internal() {
        let err = ServerError::Template {
            fingerprint: fp(),
            server_ref: "v2025.1.0".to_string(),
            source: HostError::InvalidModulePath {
                module: "roadrunner".to_string(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::FetchFailed);
        assert_eq!(err.kind().status_code(), StatusCode::Internal);

        let err = ServerError::Template {
            fingerprint: fp(),
            server_ref: "v2025.1.0".to_string(),
            source: HostError::UnsupportedHost {
                host: "bitbucket.org".to_string(),
            },
        };
        assert_eq!(err.kind().status_code(), StatusCode::Internal);
    }

    #[test]
    fn builder_template_errors_are_internal() {
        let err = ServerError::Build {
            fingerprint: fp(),
            server_ref: "v1.9.0".to_string(),
            source: BuildError::Template(TemplateError::UnknownVariant {
                major: "v1".to_string(),
            }),
            log: String::new(),
        };
        assert_eq!(err.kind(), ErrorKind::ToolchainFailed);
        assert_eq!(err.kind().status_code(), StatusCode::Internal);
    }

    #[test]
    fn bad_server_refs_are_invalid_argument() {
        let err = ServerError::InvalidServerRef {
            source: TemplateError::UnknownVariant {
                major: "v1".to_string(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::UnknownVariant);
        assert_eq!(err.kind().status_code(), StatusCode::InvalidArgument);
    }
}
