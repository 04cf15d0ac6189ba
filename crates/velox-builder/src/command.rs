use std::fmt;
use std::future::Future;
use std::process::Stdio;

use camino::Utf8PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::{BuildError, BuildLog, Result};

/// One toolchain invocation. The parent process's working directory is
/// never changed; `cwd` applies to the child only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub cwd: Utf8PathBuf,
}

impl ToolCommand {
    pub fn new<I, S>(args: I, cwd: Utf8PathBuf) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            cwd,
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value following `flag` in the arguments
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("go")?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Executes toolchain commands, streaming output into the build log.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(&self, command: &ToolCommand, log: &BuildLog) -> impl Future<Output = Result<()>> + Send;
}

/// Runs commands with the `go` binary found on `PATH`.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    program: String,
}

impl Default for GoToolchain {
    fn default() -> Self {
        Self {
            program: "go".to_string(),
        }
    }
}

impl GoToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another executable, e.g. a pinned `go1.25.2` wrapper
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl CommandRunner for GoToolchain {
    async fn run(&self, command: &ToolCommand, log: &BuildLog) -> Result<()> {
        tracing::info!(cmd = %command, cwd = %command.cwd, "executing command");

        let mut child = tokio::process::Command::new(&self.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::Spawn {
                command: command.to_string(),
                source: e,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, _, _) = tokio::join!(
            child.wait(),
            forward(stdout, log, "stdout"),
            forward(stderr, log, "stderr"),
        );

        let status = status.map_err(|e| BuildError::Spawn {
            command: command.to_string(),
            source: e,
        })?;

        if !status.success() {
            return Err(BuildError::Toolchain {
                command: command.to_string(),
                status: status.to_string(),
                log: log.contents(),
            });
        }
        Ok(())
    }
}

async fn forward<R: AsyncRead + Unpin>(stream: Option<R>, log: &BuildLog, name: &'static str) {
    let Some(stream) = stream else {
        return;
    };
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!(stream = name, "{}", line);
                log.append_line(&line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(stream = name, error = %e, "failed to read toolchain output");
                break;
            }
        }
    }
}
