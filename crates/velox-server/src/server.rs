use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use tracing::Instrument;
use velox_builder::{BuildLog, Builder, CommandRunner, OutputPolicy};
use velox_cache::{EvictReason, ExpiringLru, Fingerprint, fingerprint};
use velox_host::{SourceHost, TemplateSource};
use velox_proto::BuildRequest;
use velox_resolver::PluginRequest;
use velox_template::Variant;

use crate::{Result, ServerError};

pub const BUILD_CACHE_CAPACITY: usize = 100;
pub const BUILD_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
pub const IN_FLIGHT_CAPACITY: usize = 100;
pub const IN_FLIGHT_TTL: Duration = Duration::from_secs(5 * 60);
/// How often expired cache entries are purged
pub const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Returned as the log of a cache hit
pub const CACHED_MARKER: &str = "cached output, logs are available only on the first build";

#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Parent of every `<fingerprint>` scratch directory
    pub temp_dir: Utf8PathBuf,
    /// Home used for `GOPATH`/`GOCACHE`; the user's home when unset
    pub home_dir: Option<Utf8PathBuf>,
    pub transitive_replace: bool,
    pub build_cache_capacity: usize,
    pub build_cache_ttl: Duration,
}

impl ServerOptions {
    pub fn new(temp_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            home_dir: None,
            transitive_replace: false,
            build_cache_capacity: BUILD_CACHE_CAPACITY,
            build_cache_ttl: BUILD_CACHE_TTL,
        }
    }
}

/// A produced (or cached) binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub path: Utf8PathBuf,
    pub logs: String,
    pub cached: bool,
}

/// The orchestrator. Cheap to clone; clones share caches.
pub struct BuildServer<S, H, R> {
    inner: Arc<BuildServerInner<S, H, R>>,
}

impl<S, H, R> Clone for BuildServer<S, H, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, H, R> Deref for BuildServer<S, H, R> {
    type Target = BuildServerInner<S, H, R>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct BuildServerInner<S, H, R> {
    source: S,
    host: Arc<H>,
    runner: R,
    options: ServerOptions,
    /// fingerprint -> binary path
    builds: ExpiringLru<Fingerprint, Utf8PathBuf>,
    in_flight: ExpiringLru<Fingerprint, ()>,
    /// (binary, scratch dir) pairs evicted from `builds`, awaiting deletion
    evicted: Arc<Mutex<Vec<(Utf8PathBuf, Utf8PathBuf)>>>,
    /// Held while deleting, so a drain finishes before the next one returns
    reclaim: tokio::sync::Mutex<()>,
}

impl<S, H, R> BuildServer<S, H, R>
where
    S: TemplateSource,
    H: SourceHost,
    R: CommandRunner,
{
    pub fn new(source: S, host: H, runner: R, options: ServerOptions) -> Self {
        let scratch_parent = options.temp_dir.clone();
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::clone(&evicted);
        let builds = ExpiringLru::new(options.build_cache_capacity, options.build_cache_ttl)
            .with_eviction(move |fp: &Fingerprint, path: &Utf8PathBuf, reason: EvictReason| {
                tracing::info!(fingerprint = %fp, path = %path, ?reason, "evicting cached build");
                let entry = (path.clone(), scratch_parent.join(fp.as_str()));
                match queue.lock() {
                    Ok(mut pending) => pending.push(entry),
                    Err(poisoned) => poisoned.into_inner().push(entry),
                }
            });

        Self {
            inner: Arc::new(BuildServerInner {
                source,
                host: Arc::new(host),
                runner,
                options,
                builds,
                in_flight: ExpiringLru::new(IN_FLIGHT_CAPACITY, IN_FLIGHT_TTL),
                evicted,
                reclaim: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Path of a cached binary, if the fingerprint has one
    pub fn cached(&self, fp: &Fingerprint) -> Option<Utf8PathBuf> {
        self.builds.get(fp)
    }

    pub fn is_in_flight(&self, fp: &Fingerprint) -> bool {
        self.in_flight.contains(fp)
    }

    pub async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome> {
        validate(request)?;
        let fp = fingerprint(request);
        let span = tracing::info_span!(
            "build",
            request_id = %request.request_id,
            fingerprint = %fp,
            server_ref = %request.server_ref,
        );
        self.build_fingerprint(request, fp).instrument(span).await
    }

    async fn build_fingerprint(&self, request: &BuildRequest, fp: Fingerprint) -> Result<BuildOutcome> {
        if !self.in_flight.insert_if_absent(fp.clone(), ()) {
            tracing::warn!("build already in progress");
            return Err(ServerError::AlreadyInProgress { fingerprint: fp });
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            fp: fp.clone(),
        };

        if let Some(path) = self.builds.get(&fp) {
            if request.force_rebuild {
                tracing::info!(path = %path, "force rebuild, dropping cached binary");
                self.builds.remove(&fp);
            } else if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::info!(path = %path, "serving cached build");
                self.remove_evicted().await;
                return Ok(BuildOutcome {
                    path,
                    logs: CACHED_MARKER.to_string(),
                    cached: true,
                });
            } else {
                tracing::warn!(path = %path, "cached binary vanished, rebuilding");
                self.builds.remove(&fp);
            }
        }
        // the old scratch dir must be gone before the template lands there again
        self.remove_evicted().await;

        let log = BuildLog::new();
        match self.run_pipeline(request, &fp, &log).await {
            Ok(path) => {
                self.builds.insert(fp, path.clone());
                self.remove_evicted().await;
                Ok(BuildOutcome {
                    path,
                    logs: log.contents(),
                    cached: false,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "build failed");
                let scratch = self.options.temp_dir.join(fp.as_str());
                if let Err(err) = velox_io::remove_dir_all_if_exists(&scratch).await {
                    tracing::warn!(path = %scratch, error = %err, "failed to remove scratch directory");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &BuildRequest,
        fp: &Fingerprint,
        log: &BuildLog,
    ) -> Result<Utf8PathBuf> {
        let temp_dir = &self.options.temp_dir;
        let root = self
            .source
            .download_archive(temp_dir, fp.as_str(), &request.server_ref)
            .await
            .map_err(|source| ServerError::Template {
                fingerprint: fp.clone(),
                server_ref: request.server_ref.clone(),
                source,
            })?;

        let platform = request
            .target_platform
            .clone()
            .unwrap_or_else(velox_config::host_platform);

        let requests = request
            .plugins
            .iter()
            .map(|p| PluginRequest::new(&p.module_name, &p.tag).with_replace(p.replace.clone()))
            .collect();
        let modules = velox_resolver::resolve_all(Arc::clone(&self.host), requests)
            .await
            .map_err(|source| ServerError::Resolve {
                fingerprint: fp.clone(),
                source,
            })?;

        let mut builder = Builder::new(root, &self.runner)
            .with_plugins(modules)
            .with_output_dir(temp_dir.join(fp.as_str()).join("bin"), OutputPolicy::Clean)
            .with_server_ref(&request.server_ref)
            .with_target(platform.os, platform.arch)
            .with_log(log.clone())
            .with_transitive_replace(self.options.transitive_replace)
            .with_cleanup_dir(temp_dir);
        if let Some(home) = &self.options.home_dir {
            builder = builder.with_home_dir(home);
        }

        builder.build().await.map_err(|source| ServerError::Build {
            fingerprint: fp.clone(),
            server_ref: request.server_ref.clone(),
            source,
            log: log.contents(),
        })
    }

    /// Drop expired entries from both caches, running eviction cleanup.
    pub async fn purge_expired(&self) -> usize {
        let purged = self.builds.purge_expired() + self.in_flight.purge_expired();
        self.remove_evicted().await;
        purged
    }

    /// Delete the files of every build evicted since the last call.
    async fn remove_evicted(&self) {
        let _reclaim = self.reclaim.lock().await;
        let pending = match self.evicted.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for (binary, scratch) in pending {
            if let Err(e) = velox_io::remove_file_if_exists(&binary).await {
                tracing::warn!(path = %binary, error = %e, "failed to remove evicted binary");
            }
            if let Err(e) = velox_io::remove_dir_all_if_exists(&scratch).await {
                tracing::warn!(path = %scratch, error = %e, "failed to remove evicted scratch directory");
            }
        }
    }

    /// Periodically [`purge_expired`](Self::purge_expired) until aborted.
    pub fn spawn_reaper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let server = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = server.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "purged expired cache entries");
                }
            }
        })
    }
}

/// Reject requests that cannot be fingerprinted meaningfully.
pub fn validate(request: &BuildRequest) -> Result<()> {
    if request.server_ref.trim().is_empty() {
        return Err(ServerError::InvalidRequest {
            reason: "server_ref is required".to_string(),
        });
    }
    Variant::from_server_ref(&request.server_ref)
        .map_err(|source| ServerError::InvalidServerRef { source })?;
    if request.plugins.is_empty() {
        return Err(ServerError::NoPluginsConfigured);
    }
    for (i, plugin) in request.plugins.iter().enumerate() {
        if plugin.module_name.trim().is_empty() {
            return Err(ServerError::InvalidRequest {
                reason: format!("plugin #{i}: module_name is required"),
            });
        }
        if plugin.tag.trim().is_empty() {
            return Err(ServerError::InvalidRequest {
                reason: format!("plugin {}: tag is required", plugin.module_name),
            });
        }
    }
    Ok(())
}

struct InFlightGuard<'a> {
    set: &'a ExpiringLru<Fingerprint, ()>,
    fp: Fingerprint,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.fp);
    }
}
