//! `velox.toml` parsing
//!
//! The file is read into a raw model, then validated into a [`Config`]
//! with defaults filled in and token references expanded.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use facet::Facet;
use thiserror::Error;
use velox_proto::{BuildRequest, ErrorKind, PluginSpec};

mod expand;
mod platform;


pub use expand::expand_env;
pub use platform::{NATIVE, TargetPlatform, go_arch, go_os, host_platform};

pub const DEFAULT_CONFIG_FILE: &str = "velox.toml";
pub const DEFAULT_SERVER_REF: &str = "master";
pub const DEFAULT_LOG_LEVEL: &str = "debug";
pub const DEFAULT_LOG_MODE: &str = "development";
/// Consulted when no GitHub token is configured
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("plugins configuration is required")]
    NoPlugins,

    #[error("plugin {plugin}: {field} is required")]
    MissingField {
        plugin: String,
        field: &'static str,
    },

    #[error("roadrunner.ref may not be empty")]
    EmptyServerRef,
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Read { .. } => ErrorKind::IoFailed,
            _ => ErrorKind::InvalidConfig,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// How log lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub mode: String,
}

impl LogConfig {
    /// `production` logs JSON lines, `development` is human-readable.
    pub fn format(&self) -> LogFormat {
        match self.mode.as_str() {
            "production" => LogFormat::Json,
            "development" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            mode: DEFAULT_LOG_MODE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabConfig {
    pub endpoint: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    /// Table name under `[plugins]`
    pub name: String,
    pub module_name: String,
    pub tag: String,
    pub replace: Option<String>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_ref: String,
    pub debug: bool,
    pub log: LogConfig,
    pub target_platform: TargetPlatform,
    pub github_token: Option<String>,
    pub gitlab: Option<GitLabConfig>,
    /// Sorted by name
    pub plugins: Vec<PluginConfig>,
}

impl Config {
    pub fn from_path(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_owned(),
            source: e,
        })?;
        tracing::debug!(path = %path, "loaded configuration");
        Self::parse(&contents)
    }

    /// Parse against the process environment.
    pub fn parse(contents: &str) -> Result<Self> {
        Self::parse_with_env(contents, |name| std::env::var(name).ok())
    }

    /// Parse, resolving `$VAR` references and the token fallback through
    /// `lookup`.
    pub fn parse_with_env(
        contents: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let raw: RawConfig =
            facet_toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let server_ref = raw
            .roadrunner
            .and_then(|r| r.reference)
            .unwrap_or_else(|| DEFAULT_SERVER_REF.to_string());

        let defaults = LogConfig::default();
        let log = match raw.log {
            Some(log) => LogConfig {
                level: log.level.filter(|l| !l.is_empty()).unwrap_or(defaults.level),
                mode: log.mode.filter(|m| !m.is_empty()).unwrap_or(defaults.mode),
            },
            None => defaults,
        };

        let target_platform = raw
            .target_platform
            .map(|p| TargetPlatform::new(p.os, p.arch))
            .unwrap_or_default();

        let expand_token = |token: Option<RawToken>| {
            token
                .and_then(|t| t.token)
                .map(|t| expand_env(&t, &lookup))
                .filter(|t| !t.is_empty())
        };
        let github_token = expand_token(raw.github.and_then(|g| g.token))
            .or_else(|| lookup(GITHUB_TOKEN_ENV).filter(|t| !t.is_empty()));
        let gitlab = raw.gitlab.map(|g| GitLabConfig {
            endpoint: g.endpoint.filter(|e| !e.is_empty()),
            token: expand_token(g.token),
        });

        let plugins = plugin_list(raw.plugins.unwrap_or_default());

        let config = Config {
            server_ref,
            debug: raw.debug.and_then(|d| d.enabled).unwrap_or(false),
            log,
            target_platform,
            github_token,
            gitlab,
            plugins,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_ref.trim().is_empty() {
            return Err(ConfigError::EmptyServerRef);
        }
        if self.plugins.is_empty() {
            return Err(ConfigError::NoPlugins);
        }
        for plugin in &self.plugins {
            if plugin.module_name.is_empty() {
                return Err(ConfigError::MissingField {
                    plugin: plugin.name.clone(),
                    field: "module_name",
                });
            }
            if plugin.tag.is_empty() {
                return Err(ConfigError::MissingField {
                    plugin: plugin.name.clone(),
                    field: "tag",
                });
            }
        }
        Ok(())
    }

    /// The request this configuration describes. The platform is left
    /// out when both fields follow the host.
    pub fn build_request(&self, request_id: impl Into<String>) -> BuildRequest {
        BuildRequest {
            request_id: request_id.into(),
            server_ref: self.server_ref.clone(),
            plugins: self
                .plugins
                .iter()
                .map(|p| PluginSpec {
                    module_name: p.module_name.clone(),
                    tag: p.tag.clone(),
                    replace: p.replace.clone(),
                })
                .collect(),
            target_platform: self.target_platform.requested(),
            force_rebuild: false,
        }
    }
}

fn plugin_list(raw: HashMap<String, RawPlugin>) -> Vec<PluginConfig> {
    let mut plugins: Vec<PluginConfig> = raw
        .into_iter()
        .map(|(name, p)| PluginConfig {
            name,
            module_name: p.module_name.unwrap_or_default(),
            tag: p.tag.unwrap_or_default(),
            replace: p.replace.filter(|r| !r.is_empty()),
        })
        .collect();
    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    plugins
}

#[derive(Facet, Debug)]
struct RawConfig {
    roadrunner: Option<RawRoadRunner>,
    debug: Option<RawDebug>,
    log: Option<RawLog>,
    target_platform: Option<RawPlatform>,
    github: Option<RawGitHub>,
    gitlab: Option<RawGitLab>,
    plugins: Option<HashMap<String, RawPlugin>>,
}

#[derive(Facet, Debug)]
struct RawRoadRunner {
    #[facet(rename = "ref")]
    reference: Option<String>,
}

#[derive(Facet, Debug)]
struct RawDebug {
    enabled: Option<bool>,
}

#[derive(Facet, Debug)]
struct RawLog {
    level: Option<String>,
    mode: Option<String>,
}

#[derive(Facet, Debug)]
struct RawPlatform {
    os: Option<String>,
    arch: Option<String>,
}

#[derive(Facet, Debug)]
struct RawToken {
    token: Option<String>,
}

#[derive(Facet, Debug)]
struct RawGitHub {
    token: Option<RawToken>,
}

#[derive(Facet, Debug)]
struct RawGitLab {
    endpoint: Option<String>,
    token: Option<RawToken>,
}

#[derive(Facet, Debug)]
struct RawPlugin {
    module_name: Option<String>,
    tag: Option<String>,
    replace: Option<String>,
}
