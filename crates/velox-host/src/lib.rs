//! Source-host collaborators.
//!
//! - [`SourceHost`]: plugin `go.mod` and latest-commit lookups, implemented
//!   for GitHub and GitLab and dispatched by [`HostRouter`]
//! - [`TemplateSource`]: delivers an unpacked RoadRunner server template,
//!   implemented by [`ArchiveFetcher`]

mod archive;
mod coords;
mod error;
mod github;
mod gitlab;
mod http;
mod reference;
mod router;

pub use archive::{ARCHIVE_EXTENSION, ArchiveFetcher, SERVER_REPO_URL, TemplateSource};
pub use coords::{RepoCoordinates, is_major_suffix};
pub use error::{HostError, Result};
pub use github::{GITHUB_API, GitHubHost};
pub use gitlab::{GITLAB_ENDPOINT, GitLabHost};
pub use http::{FETCH_TIMEOUT, build_client};
pub use reference::{ServerRef, template_dir_name};
pub use router::HostRouter;

use std::future::Future;

/// Head commit of a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    /// Committer timestamp, if the host reported one
    pub timestamp: Option<jiff::Timestamp>,
}

/// Remote lookups the plugin resolver needs.
pub trait SourceHost: Send + Sync + 'static {
    /// Raw bytes of `<folder>/go.mod` at `reference`
    fn fetch_plugin_manifest(
        &self,
        repo: &RepoCoordinates,
        reference: &str,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// First commit of the listing for `reference` (page 1, one per page).
    /// `None` when the host returned no commits.
    fn fetch_latest_commit(
        &self,
        repo: &RepoCoordinates,
        reference: &str,
    ) -> impl Future<Output = Result<Option<CommitInfo>>> + Send;
}
