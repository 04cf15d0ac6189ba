use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use velox_host::{RepoCoordinates, SourceHost};

use crate::version::{VersionDescriptor, is_version_tag, pseudo_version};
use crate::{
    PluginError, PluginFailure, PluginRequest, ResolveError, ResolvedModule, SHORT_SHA_LEN,
    parse_module_line,
};

/// Concurrent lookups against the source host
pub const WORKERS: usize = 10;

/// Jobs buffered before `add` waits for a worker
pub const QUEUE_CAPACITY: usize = 100;

/// A queued lookup. Dropping one unfinished (a worker panicked, or the
/// channel went away with it buffered) records it as lost, so `wait` can't
/// hang on it.
struct Job {
    position: usize,
    request: PluginRequest,
    shared: Arc<Shared>,
    finished: bool,
}

impl Job {
    fn finish(mut self, result: Result<ResolvedModule, PluginError>) {
        self.finished = true;
        self.shared.record(self.position, &self.request.name, result);
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if !self.finished {
            self.shared
                .record(self.position, &self.request.name, Err(PluginError::WorkerLost));
        }
    }
}

#[derive(Default)]
struct Outcomes {
    in_flight: usize,
    modules: Vec<(usize, ResolvedModule)>,
    failures: Vec<(usize, PluginFailure)>,
}

struct Shared {
    outcomes: Mutex<Outcomes>,
    idle: Notify,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Outcomes> {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, position: usize, name: &str, result: Result<ResolvedModule, PluginError>) {
        let mut outcomes = self.lock();
        match result {
            Ok(module) => outcomes.modules.push((position, module)),
            Err(cause) => {
                tracing::warn!(plugin = %name, error = %cause, "plugin resolution failed");
                outcomes.failures.push((
                    position,
                    PluginFailure {
                        plugin: name.to_string(),
                        cause,
                    },
                ));
            }
        }
        outcomes.in_flight = outcomes.in_flight.saturating_sub(1);
        if outcomes.in_flight == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// Fixed pool of workers resolving plugins against a [`SourceHost`].
///
/// `add` jobs, `wait` until none are in flight, then `finish` to collect.
/// Results come back in completion order.
pub struct ResolverPool {
    jobs: mpsc::Sender<Job>,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    submitted: usize,
}

impl ResolverPool {
    pub fn new<H: SourceHost>(host: Arc<H>) -> Self {
        let (jobs, receiver) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shared = Arc::new(Shared {
            outcomes: Mutex::new(Outcomes::default()),
            idle: Notify::new(),
        });

        let workers = (0..WORKERS)
            .map(|worker| {
                let host = host.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        let Some(job) = job else {
                            break;
                        };
                        tracing::debug!(worker, plugin = %job.request.name, "resolving plugin");
                        let result = resolve_one(host.as_ref(), &job.request).await;
                        job.finish(result);
                    }
                })
            })
            .collect();

        Self {
            jobs,
            shared,
            workers,
            submitted: 0,
        }
    }

    pub async fn add(&mut self, request: PluginRequest) {
        let position = self.submitted;
        self.submitted += 1;
        self.shared.lock().in_flight += 1;

        let job = Job {
            position,
            request,
            shared: self.shared.clone(),
            finished: false,
        };
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job).await {
            // every worker is gone
            job.finish(Err(PluginError::PoolClosed));
        }
    }

    /// Wait until every added job has been recorded.
    pub async fn wait(&self) {
        loop {
            let idle = self.shared.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.shared.lock().in_flight == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Close the job channel and return the modules, or every failure.
    pub async fn finish(self) -> Result<Vec<ResolvedModule>, ResolveError> {
        let (modules, failures) = self.finish_indexed().await;
        if !failures.is_empty() {
            return Err(into_error(failures));
        }
        Ok(modules.into_iter().map(|(_, m)| m).collect())
    }

    async fn finish_indexed(self) -> (Vec<(usize, ResolvedModule)>, Vec<(usize, PluginFailure)>) {
        self.wait().await;
        drop(self.jobs);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "resolver worker panicked");
            }
        }

        let outcomes = std::mem::take(&mut *self.shared.lock());
        (outcomes.modules, outcomes.failures)
    }
}

fn into_error(mut failures: Vec<(usize, PluginFailure)>) -> ResolveError {
    failures.sort_by_key(|(position, _)| *position);
    ResolveError {
        failures: failures.into_iter().map(|(_, f)| f).collect(),
    }
}

/// Resolve every request. Tags and `latest` resolve immediately; the rest
/// go through a [`ResolverPool`]. The returned modules follow request order.
pub async fn resolve_all<H: SourceHost>(
    host: Arc<H>,
    requests: Vec<PluginRequest>,
) -> Result<Vec<ResolvedModule>, ResolveError> {
    let mut resolved: Vec<(usize, ResolvedModule)> = Vec::with_capacity(requests.len());
    let mut failures: Vec<(usize, PluginFailure)> = Vec::new();
    let mut remote: Vec<(usize, PluginRequest)> = Vec::new();

    for (position, request) in requests.into_iter().enumerate() {
        match local_version(&request.reference) {
            Some(Ok(version)) => resolved.push((
                position,
                ResolvedModule {
                    name: request.name,
                    module: request.module,
                    version,
                    replace: request.replace,
                },
            )),
            Some(Err(cause)) => failures.push((
                position,
                PluginFailure {
                    plugin: request.name,
                    cause,
                },
            )),
            None => remote.push((position, request)),
        }
    }

    if !remote.is_empty() {
        let mut pool = ResolverPool::new(host);
        // positions inside the pool are local; map them back afterwards
        let positions: Vec<usize> = remote.iter().map(|(p, _)| *p).collect();
        for (_, request) in remote {
            pool.add(request).await;
        }
        let (modules, pool_failures) = pool.finish_indexed().await;
        resolved.extend(modules.into_iter().map(|(i, m)| (positions[i], m)));
        failures.extend(pool_failures.into_iter().map(|(i, f)| (positions[i], f)));
    }

    if !failures.is_empty() {
        return Err(into_error(failures));
    }

    resolved.sort_by_key(|(position, _)| *position);
    Ok(resolved.into_iter().map(|(_, m)| m).collect())
}

/// Version known without asking the host, if any
fn local_version(reference: &str) -> Option<Result<VersionDescriptor, PluginError>> {
    if reference.is_empty() {
        return Some(Err(PluginError::EmptyReference));
    }
    if reference == "latest" {
        return Some(Ok(VersionDescriptor::Latest));
    }
    if is_version_tag(reference) {
        return Some(Ok(VersionDescriptor::Tag(reference.to_string())));
    }
    None
}

async fn resolve_one<H: SourceHost>(
    host: &H,
    request: &PluginRequest,
) -> Result<ResolvedModule, PluginError> {
    if request.reference.is_empty() {
        return Err(PluginError::EmptyReference);
    }

    let repo = RepoCoordinates::from_module_path(&request.module)?;

    let manifest = host.fetch_plugin_manifest(&repo, &request.reference).await?;
    let manifest = String::from_utf8(manifest).map_err(|_| PluginError::ManifestNotUtf8)?;
    let module = parse_module_line(&manifest)?;

    let commit = host
        .fetch_latest_commit(&repo, &request.reference)
        .await?
        .ok_or_else(|| PluginError::NoCommits {
            reference: request.reference.clone(),
        })?;

    if commit.sha.len() < SHORT_SHA_LEN {
        return Err(PluginError::ShortSha { sha: commit.sha });
    }

    let version = pseudo_version(&module, commit.timestamp, &commit.sha);
    tracing::debug!(plugin = %request.name, module = %module, version = %version, "plugin resolved");

    Ok(ResolvedModule {
        name: request.name.clone(),
        module,
        version: VersionDescriptor::Pseudo(version),
        replace: request.replace.clone(),
    })
}
