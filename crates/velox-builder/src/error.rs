use camino::Utf8PathBuf;
use velox_proto::ErrorKind;
use velox_template::TemplateError;

/// Lines of toolchain output quoted in a failure message
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no plugins configured")]
    NoPluginsConfigured,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not determine the user home directory")]
    NoHomeDirectory,

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed with {status}\n{}", tail(.log))]
    Toolchain {
        command: String,
        status: String,
        log: String,
    },

    #[error("toolchain reported success but {path} was not produced")]
    MissingBinary { path: Utf8PathBuf },
}

fn tail(log: &str) -> String {
    let lines: Vec<&str> = log.lines().collect();
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[start..].join("\n")
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::NoPluginsConfigured => ErrorKind::NoPluginsConfigured,
            BuildError::Template(e) => e.kind(),
            BuildError::Io { .. } | BuildError::NoHomeDirectory => ErrorKind::IoFailed,
            BuildError::Spawn { .. }
            | BuildError::Toolchain { .. }
            | BuildError::MissingBinary { .. } => ErrorKind::ToolchainFailed,
        }
    }

    pub(crate) fn io(path: impl Into<Utf8PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| BuildError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
