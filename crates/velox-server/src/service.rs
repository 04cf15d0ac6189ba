use std::sync::Arc;

use camino::Utf8Path;
use rapace::transport::StreamTransport;
use velox_builder::{CLEANUP_PREFIX, CommandRunner};
use velox_host::{SourceHost, TemplateSource};
use velox_io::net::Listener;
use velox_proto::{
    BuildRequest, BuildResponse, BuildService, BuildServiceServer, PROTOCOL_VERSION,
    ServiceVersion,
};

use crate::BuildServer;

pub const SERVICE_NAME: &str = "velox";

impl<S, H, R> BuildService for BuildServer<S, H, R>
where
    S: TemplateSource,
    H: SourceHost,
    R: CommandRunner,
{
    async fn build(&self, request: BuildRequest) -> BuildResponse {
        match BuildServer::build(self, &request).await {
            Ok(outcome) => BuildResponse::success(outcome.path.into_string(), outcome.logs, outcome.cached),
            Err(e) => {
                let mut response = BuildResponse::failure(e.kind(), e.to_string());
                response.logs = e.log().to_string();
                response
            }
        }
    }

    async fn version(&self) -> ServiceVersion {
        ServiceVersion {
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Remove scratch entries orphaned by a previous process.
pub async fn startup_sweep(temp_dir: &Utf8Path) -> usize {
    let removed = velox_io::sweep_prefixed(temp_dir, CLEANUP_PREFIX).await;
    if !removed.is_empty() {
        tracing::info!(count = removed.len(), dir = %temp_dir, "removed stale scratch entries");
    }
    removed.len()
}

/// Accept connections until the listener fails, one task per connection.
pub async fn serve<S, H, R>(server: BuildServer<S, H, R>, listener: Listener) -> eyre::Result<()>
where
    S: TemplateSource,
    H: SourceHost,
    R: CommandRunner,
{
    tracing::info!(address = %listener.local_addr()?, "build service listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let server = server.clone();

        tokio::spawn(async move {
            tracing::debug!(peer = %peer, "new connection");
            let transport = Arc::new(StreamTransport::new(stream));
            // boxed so the Send check sees concrete lifetimes instead of the
            // erased ones in the spawned future's witness
            let serving: std::pin::Pin<
                Box<dyn std::future::Future<Output = Result<(), rapace::RpcError>> + Send>,
            > = Box::pin(BuildServiceServer::new(server).serve(transport));
            if let Err(e) = serving.await {
                tracing::warn!(peer = %peer, error = %e, "connection error");
            }
            tracing::debug!(peer = %peer, "connection closed");
        });
    }
}
