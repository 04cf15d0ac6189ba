use std::time::Duration;

use reqwest::Url;

use crate::{HostError, Result};

/// Connect and read timeout for every remote fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("velox/", env!("CARGO_PKG_VERSION"));

pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(FETCH_TIMEOUT)
        .read_timeout(FETCH_TIMEOUT)
        .build()
        .map_err(HostError::Client)
}

pub(crate) fn parse_url(url: &str, params: &[(&str, &str)]) -> Result<Url> {
    let parsed = if params.is_empty() {
        Url::parse(url)
    } else {
        Url::parse_with_params(url, params)
    };
    parsed.map_err(|e| HostError::Url {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Send `request` and return the body of a successful response.
pub(crate) async fn send_bytes(request: reqwest::RequestBuilder, url: &Url) -> Result<Vec<u8>> {
    tracing::debug!(url = %url, "fetching");

    let response = request.send().await.map_err(|e| HostError::Request {
        url: url.to_string(),
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(HostError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await.map_err(|e| HostError::Request {
        url: url.to_string(),
        source: e,
    })?;

    Ok(bytes.to_vec())
}

pub(crate) async fn send_text(request: reqwest::RequestBuilder, url: &Url) -> Result<String> {
    let bytes = send_bytes(request, url).await?;
    String::from_utf8(bytes).map_err(|_| HostError::Decode {
        url: url.to_string(),
        message: "body is not UTF-8".to_string(),
    })
}

/// Empty or missing tokens are treated alike
pub(crate) fn normalize_token(token: Option<String>) -> Option<String> {
    token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// RFC 3339 commit timestamp
pub(crate) fn parse_timestamp(url: &Url, value: &str) -> Result<jiff::Timestamp> {
    value.parse::<jiff::Timestamp>().map_err(|e| HostError::Decode {
        url: url.to_string(),
        message: format!("bad commit timestamp {value:?}: {e}"),
    })
}
