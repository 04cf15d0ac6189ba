//! GitHub REST API client

use facet::Facet;

use crate::http::{self, parse_url, send_bytes, send_text};
use crate::{CommitInfo, HostError, RepoCoordinates, Result, SourceHost};

pub const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Facet)]
struct Commit {
    sha: String,
    commit: CommitDetail,
}

#[derive(Debug, Facet)]
struct CommitDetail {
    committer: Option<Signature>,
}

#[derive(Debug, Facet)]
struct Signature {
    date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitHubHost {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubHost {
    pub fn new(token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            api_base: GITHUB_API.to_string(),
            token: http::normalize_token(token),
        })
    }

    /// Point at a GitHub Enterprise API root instead of api.github.com
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &reqwest::Url) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url.clone())
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl SourceHost for GitHubHost {
    async fn fetch_plugin_manifest(
        &self,
        repo: &RepoCoordinates,
        reference: &str,
    ) -> Result<Vec<u8>> {
        let url = parse_url(
            &format!(
                "{}/repos/{}/{}/contents/{}",
                self.api_base,
                repo.owner,
                repo.repo,
                repo.manifest_path()
            ),
            &[("ref", reference)],
        )?;

        let request = self
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.raw+json");
        let body = send_bytes(request, &url).await?;
        if body.is_empty() {
            return Err(HostError::EmptyBody {
                url: url.to_string(),
            });
        }
        Ok(body)
    }

    async fn fetch_latest_commit(
        &self,
        repo: &RepoCoordinates,
        reference: &str,
    ) -> Result<Option<CommitInfo>> {
        let url = parse_url(
            &format!("{}/repos/{}/{}/commits", self.api_base, repo.owner, repo.repo),
            &[("sha", reference), ("page", "1"), ("per_page", "1")],
        )?;

        let request = self
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        let body = send_text(request, &url).await?;

        let commits: Vec<Commit> = facet_json::from_str(&body).map_err(|e| HostError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let Some(first) = commits.into_iter().next() else {
            return Ok(None);
        };

        let timestamp = match first.commit.committer.and_then(|c| c.date) {
            Some(date) => Some(http::parse_timestamp(&url, &date)?),
            None => None,
        };

        Ok(Some(CommitInfo {
            sha: first.sha,
            timestamp,
        }))
    }
}
