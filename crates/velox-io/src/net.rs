//! Listener endpoints for the build service.

use eyre::Result;
use tokio::io::{AsyncRead, AsyncWrite};

/// Where the build service listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`
    Tcp(String),
    #[cfg(unix)]
    Unix(camino::Utf8PathBuf),
}

impl Endpoint {
    /// Accepts `host:port`, `tcp://host:port` and, on unix, `unix:/path`.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();

        #[cfg(unix)]
        if let Some(path) = endpoint.strip_prefix("unix:") {
            return Ok(Endpoint::Unix(camino::Utf8PathBuf::from(path)));
        }

        if let Some(rest) = endpoint.strip_prefix("tcp://") {
            return Ok(Endpoint::Tcp(rest.to_string()));
        }

        if endpoint.contains("://") {
            eyre::bail!(
                "unsupported address scheme (expected tcp://, unix: or host:port): {}",
                endpoint
            );
        }

        if endpoint.is_empty() {
            eyre::bail!("empty listen address");
        }

        Ok(Endpoint::Tcp(endpoint.to_string()))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => f.write_str(addr),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path),
        }
    }
}

/// Anything the RPC transport can run over
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static> Connection for T {}

/// A connected TCP or unix stream
pub type Stream = Box<dyn Connection>;

pub enum Listener {
    Tcp(tokio::net::TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
}

impl Listener {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => Ok(Listener::Tcp(tokio::net::TcpListener::bind(addr).await?)),
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                // stale socket from a previous run
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(Listener::Unix(tokio::net::UnixListener::bind(
                    path.as_std_path(),
                )?))
            }
        }
    }

    /// Accept a connection, returning the stream and a peer label for logs
    pub async fn accept(&self) -> Result<(Stream, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                let stream: Stream = Box::new(stream);
                Ok((stream, addr.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                let stream: Stream = Box::new(stream);
                Ok((stream, "unix".to_string()))
            }
        }
    }

    pub fn local_addr(&self) -> Result<Endpoint> {
        match self {
            Listener::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let addr = listener.local_addr()?;
                let Some(path) = addr.as_pathname() else {
                    eyre::bail!("unix socket has no pathname");
                };
                Ok(Endpoint::Unix(camino::Utf8PathBuf::try_from(
                    path.to_path_buf(),
                )?))
            }
        }
    }
}
