use std::future::Future;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use velox_cache::ArchiveCache;

use crate::http::{self, parse_url, send_bytes};
use crate::{HostError, Result, ServerRef, template_dir_name};

pub const SERVER_REPO_URL: &str = "https://github.com/roadrunner-server/roadrunner";

pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Delivers an unpacked server template.
pub trait TemplateSource: Send + Sync + 'static {
    /// Unpack the server at `server_ref` under
    /// `<temp_dir>/<scratch_leaf>/roadrunner-server-<sanitized ref>/` and
    /// return the template root.
    fn download_archive(
        &self,
        temp_dir: &Utf8Path,
        scratch_leaf: &str,
        server_ref: &str,
    ) -> impl Future<Output = Result<Utf8PathBuf>> + Send;
}

/// Downloads server archives from GitHub, through an [`ArchiveCache`].
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    cache: Arc<ArchiveCache>,
    repo_url: String,
    token: Option<String>,
}

impl ArchiveFetcher {
    pub fn new(cache: Arc<ArchiveCache>, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            cache,
            repo_url: SERVER_REPO_URL.to_string(),
            token: http::normalize_token(token),
        })
    }

    pub fn cache(&self) -> &Arc<ArchiveCache> {
        &self.cache
    }

    async fn archive_bytes(&self, server_ref: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.get(server_ref) {
            tracing::debug!(server_ref = %server_ref, size = bytes.len(), "archive cache hit");
            return Ok(bytes);
        }

        let url = ServerRef::classify(server_ref).archive_url(&self.repo_url, ARCHIVE_EXTENSION);
        let url = parse_url(&url, &[])?;
        tracing::info!(url = %url, "downloading server archive");

        let request = match &self.token {
            Some(token) => self.client.get(url.clone()).bearer_auth(token),
            None => self.client.get(url.clone()),
        };
        let bytes = send_bytes(request, &url).await?;
        if bytes.is_empty() {
            return Err(HostError::EmptyBody {
                url: url.to_string(),
            });
        }

        self.cache.set(server_ref, &bytes)?;
        Ok(bytes)
    }
}

impl TemplateSource for ArchiveFetcher {
    async fn download_archive(
        &self,
        temp_dir: &Utf8Path,
        scratch_leaf: &str,
        server_ref: &str,
    ) -> Result<Utf8PathBuf> {
        let bytes = self.archive_bytes(server_ref).await?;

        let scratch = temp_dir.join(scratch_leaf);
        let dest = scratch.join(template_dir_name(server_ref));
        velox_io::remove_dir_all_if_exists(&dest)
            .await
            .map_err(|e| HostError::Io {
                path: dest.clone(),
                source: e,
            })?;

        match velox_tarball::extract(bytes, dest.clone()).await {
            Ok(extracted) => {
                tracing::info!(path = %extracted.root, files = extracted.files, "server template unpacked");
                Ok(extracted.root)
            }
            Err(e) => {
                if let Err(cleanup) = velox_io::remove_dir_all_if_exists(&scratch).await {
                    tracing::warn!(path = %scratch, error = %cleanup, "failed to remove scratch directory");
                }
                Err(HostError::Extract {
                    reference: server_ref.to_string(),
                    source: e,
                })
            }
        }
    }
}
