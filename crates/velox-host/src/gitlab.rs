//! GitLab v4 API client

use facet::Facet;
use reqwest::Url;

use crate::http::{self, send_bytes, send_text};
use crate::{CommitInfo, HostError, RepoCoordinates, Result, SourceHost};

pub const GITLAB_ENDPOINT: &str = "https://gitlab.com";

#[derive(Debug, Facet)]
struct Commit {
    id: String,
    committed_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitLabHost {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl GitLabHost {
    pub fn new(endpoint: Option<String>, token: Option<String>) -> Result<Self> {
        let endpoint = endpoint
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| GITLAB_ENDPOINT.to_string());
        Ok(Self {
            client: http::build_client()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: http::normalize_token(token),
        })
    }

    /// Host part of the endpoint, as it appears in module paths
    pub fn host(&self) -> &str {
        let without_scheme = self
            .endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.endpoint);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }

    /// `<endpoint>/api/v4/projects/<owner%2Frepo>/repository/<tail...>`
    fn project_url(&self, repo: &RepoCoordinates, tail: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| HostError::Url {
            url: self.endpoint.clone(),
            message: e.to_string(),
        })?;

        let project = format!("{}/{}", repo.owner, repo.repo);
        {
            let mut segments = url.path_segments_mut().map_err(|_| HostError::Url {
                url: self.endpoint.clone(),
                message: "endpoint cannot be a base URL".to_string(),
            })?;
            segments.pop_if_empty();
            segments.extend(["api", "v4", "projects", project.as_str(), "repository"]);
            segments.extend(tail);
        }
        Ok(url)
    }

    fn get(&self, url: &Url) -> reqwest::RequestBuilder {
        let request = self.client.get(url.clone());
        match &self.token {
            Some(token) => request.header("PRIVATE-TOKEN", token),
            None => request,
        }
    }
}

impl SourceHost for GitLabHost {
    async fn fetch_plugin_manifest(
        &self,
        repo: &RepoCoordinates,
        reference: &str,
    ) -> Result<Vec<u8>> {
        let manifest_path = repo.manifest_path();
        let mut url = self.project_url(repo, &["files", manifest_path.as_str(), "raw"])?;
        url.query_pairs_mut().append_pair("ref", reference);

        let body = send_bytes(self.get(&url), &url).await?;
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
        let mut url = self.project_url(repo, &["commits"])?;
        url.query_pairs_mut()
            .append_pair("ref_name", reference)
            .append_pair("page", "1")
            .append_pair("per_page", "1");

        let body = send_text(self.get(&url), &url).await?;
        let commits: Vec<Commit> = facet_json::from_str(&body).map_err(|e| HostError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let Some(first) = commits.into_iter().next() else {
            return Ok(None);
        };

        let timestamp = match first.committed_date {
            Some(date) => Some(http::parse_timestamp(&url, &date)?),
            None => None,
        };

        Ok(Some(CommitInfo {
            sha: first.id,
            timestamp,
        }))
    }
}
