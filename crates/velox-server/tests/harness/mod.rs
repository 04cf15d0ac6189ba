//! Fakes for the three collaborators of a `BuildServer`.
//!
//! Nothing here touches the network or needs a Go toolchain.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tokio::sync::Notify;
use velox_builder::{BuildError, BuildLog, CommandRunner, ToolCommand};
use velox_host::{CommitInfo, HostError, RepoCoordinates, SourceHost, TemplateSource};
use velox_proto::{BuildRequest, Platform, PluginSpec};
use velox_server::{BuildServer, ServerOptions};

pub type TestServer = BuildServer<FakeSource, FakeHost, FakeRunner>;

/// Isolated temp and home directories
pub struct TestEnv {
    _dir: TempDir,
    pub temp: Utf8PathBuf,
    pub home: Utf8PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let temp = base.join("tmp");
        let home = base.join("home");
        std::fs::create_dir_all(&temp).unwrap();
        std::fs::create_dir_all(&home).unwrap();
        Self {
            _dir: dir,
            temp,
            home,
        }
    }

    pub fn options(&self) -> ServerOptions {
        let mut options = ServerOptions::new(&self.temp);
        options.home_dir = Some(self.home.clone());
        options
    }

    pub fn server(&self, runner: FakeRunner) -> (TestServer, Arc<Counters>) {
        self.server_with(runner, self.options())
    }

    pub fn server_with(&self, runner: FakeRunner, options: ServerOptions) -> (TestServer, Arc<Counters>) {
        self.server_inner(runner, options, false)
    }

    /// A server whose template download always answers 404
    pub fn server_without_template(&self, runner: FakeRunner) -> (TestServer, Arc<Counters>) {
        self.server_inner(runner, self.options(), true)
    }

    fn server_inner(&self, runner: FakeRunner, options: ServerOptions, fail: bool) -> (TestServer, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let server = BuildServer::new(
            FakeSource {
                counters: counters.clone(),
                fail,
            },
            FakeHost {
                counters: counters.clone(),
            },
            runner,
            options,
        );
        (server, counters)
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub downloads: AtomicUsize,
    pub manifests: AtomicUsize,
    pub commits: AtomicUsize,
}

impl Counters {
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn host_calls(&self) -> usize {
        self.manifests.load(Ordering::SeqCst) + self.commits.load(Ordering::SeqCst)
    }
}

/// Writes a minimal server tree instead of downloading one
pub struct FakeSource {
    counters: Arc<Counters>,
    fail: bool,
}

impl TemplateSource for FakeSource {
    async fn download_archive(
        &self,
        temp_dir: &Utf8Path,
        scratch_leaf: &str,
        server_ref: &str,
    ) -> velox_host::Result<Utf8PathBuf> {
        self.counters.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HostError::Status {
                url: format!("https://example.invalid/{server_ref}"),
                status: 404,
            });
        }

        let root = temp_dir
            .join(scratch_leaf)
            .join(velox_host::template_dir_name(server_ref));
        let io = |path: &Utf8Path| {
            let path = path.to_owned();
            move |source| HostError::Io { path, source }
        };
        tokio::fs::create_dir_all(root.join("container"))
            .await
            .map_err(io(&root))?;
        tokio::fs::write(root.join("container/plugins.go"), "package container\n")
            .await
            .map_err(io(&root))?;
        tokio::fs::write(root.join("go.mod"), "module stock\n")
            .await
            .map_err(io(&root))?;
        Ok(root)
    }
}

/// Answers for `github.com` only; every other host is unsupported
pub struct FakeHost {
    counters: Arc<Counters>,
}

impl SourceHost for FakeHost {
    async fn fetch_plugin_manifest(
        &self,
        repo: &RepoCoordinates,
        _reference: &str,
    ) -> velox_host::Result<Vec<u8>> {
        self.counters.manifests.fetch_add(1, Ordering::SeqCst);
        if repo.host != "github.com" {
            return Err(HostError::UnsupportedHost {
                host: repo.host.clone(),
            });
        }
        Ok(format!("module github.com/{}/{}\n\ngo 1.24\n", repo.owner, repo.repo).into_bytes())
    }

    async fn fetch_latest_commit(
        &self,
        _repo: &RepoCoordinates,
        _reference: &str,
    ) -> velox_host::Result<Option<CommitInfo>> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(Some(CommitInfo {
            sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
            timestamp: Some("2024-05-06T07:08:09Z".parse().unwrap()),
        }))
    }
}

/// Holds `go build` until released
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Records commands and writes a fake binary at the `-o` path
#[derive(Default)]
pub struct FakeRunner {
    pub commands: Arc<Mutex<Vec<ToolCommand>>>,
    fail_build: bool,
    gate: Option<Arc<Gate>>,
}

impl FakeRunner {
    pub fn failing() -> Self {
        Self {
            fail_build: true,
            ..Default::default()
        }
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn recorder(&self) -> Arc<Mutex<Vec<ToolCommand>>> {
        self.commands.clone()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, command: &ToolCommand, log: &BuildLog) -> velox_builder::Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        log.append_line(&format!("ran {command}"));

        let Some(output) = command.arg_after("-o") else {
            return Ok(());
        };
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.fail_build {
            log.append_line("main.go:1: undefined: plugin");
            return Err(BuildError::Toolchain {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                log: log.contents(),
            });
        }
        tokio::fs::write(output, b"fake rr").await.unwrap();
        Ok(())
    }
}

pub fn build_count(commands: &Mutex<Vec<ToolCommand>>) -> usize {
    commands
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.args.first().map(String::as_str) == Some("build"))
        .count()
}

pub fn request(plugins: Vec<PluginSpec>) -> BuildRequest {
    BuildRequest {
        request_id: "test".to_string(),
        server_ref: "v2025.1.0".to_string(),
        plugins,
        target_platform: Some(Platform::new("linux", "amd64")),
        force_rebuild: false,
    }
}

pub fn logger() -> PluginSpec {
    PluginSpec::new("github.com/roadrunner-server/logger/v5", "v5.1.8")
}

pub fn short_ttl_options(env: &TestEnv, ttl: Duration) -> ServerOptions {
    let mut options = env.options();
    options.build_cache_ttl = ttl;
    options
}
