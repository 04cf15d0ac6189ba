use crate::{CommitInfo, GitHubHost, GitLabHost, HostError, RepoCoordinates, Result, SourceHost};

/// Picks the client for a module by the host segment of its path.
#[derive(Debug, Clone)]
pub struct HostRouter {
    github: GitHubHost,
    gitlab: Option<GitLabHost>,
}

impl HostRouter {
    pub fn new(github: GitHubHost) -> Self {
        Self {
            github,
            gitlab: None,
        }
    }

    pub fn with_gitlab(mut self, gitlab: GitLabHost) -> Self {
        self.gitlab = Some(gitlab);
        self
    }

    fn route(&self, repo: &RepoCoordinates) -> Result<Route<'_>> {
        if repo.host == "github.com" {
            return Ok(Route::GitHub(&self.github));
        }
        if let Some(gitlab) = &self.gitlab {
            if repo.host == gitlab.host() {
                return Ok(Route::GitLab(gitlab));
            }
        }
        Err(HostError::UnsupportedHost {
            host: repo.host.clone(),
        })
    }
}

enum Route<'a> {
    GitHub(&'a GitHubHost),
    GitLab(&'a GitLabHost),
}

impl SourceHost for HostRouter {
    async fn fetch_plugin_manifest(
        &self,
        repo: &RepoCoordinates,
        reference: &str,
    ) -> Result<Vec<u8>> {
        match self.route(repo)? {
            Route::GitHub(host) => host.fetch_plugin_manifest(repo, reference).await,
            Route::GitLab(host) => host.fetch_plugin_manifest(repo, reference).await,
        }
    }

    async fn fetch_latest_commit(
        &self,
        repo: &RepoCoordinates,
        reference: &str,
    ) -> Result<Option<CommitInfo>> {
        match self.route(repo)? {
            Route::GitHub(host) => host.fetch_latest_commit(repo, reference).await,
            Route::GitLab(host) => host.fetch_latest_commit(repo, reference).await,
        }
    }
}
