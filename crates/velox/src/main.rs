//! velox - build RoadRunner with your own set of plugins
//!
//! `velox build` produces an `rr` binary from a `velox.toml` on this
//! machine; `velox server` exposes the same pipeline as an RPC service.

mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::Result;
use facet::Facet;
use facet_args as args;
use owo_colors::OwoColorize;

use velox_builder::{Builder, GoToolchain, OutputPolicy};
use velox_cache::ArchiveCache;
use velox_config::{Config, DEFAULT_CONFIG_FILE, GITHUB_TOKEN_ENV};
use velox_host::{ArchiveFetcher, GitHubHost, GitLabHost, HostRouter, TemplateSource};
use velox_io::net::{Endpoint, Listener};
use velox_resolver::PluginRequest;
use velox_server::{BuildServer, REAPER_INTERVAL, ServerOptions};

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

/// velox - build RoadRunner with your own set of plugins
#[derive(Facet, Debug)]
struct Cli {
    /// Show version information
    #[facet(args::named, args::short = 'V')]
    version: bool,

    #[facet(args::subcommand)]
    command: CliCommand,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CliCommand {
    /// Build a RoadRunner binary from a configuration file
    Build {
        /// Configuration file (default: velox.toml)
        #[facet(args::named, args::short = 'c')]
        config: Option<String>,

        /// Directory the binary is written to (default: current directory)
        #[facet(args::named, args::short = 'o')]
        out: Option<String>,
    },

    /// Serve builds over RPC
    Server {
        /// Listen address: host:port, tcp://host:port or unix:/path
        #[facet(args::named, args::short = 'a')]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for cause in e.chain() {
                eprintln!("{}", cause.to_string().red());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli: Cli = args::from_std_args()?;

    if cli.version {
        println!("velox {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match cli.command {
        CliCommand::Build { config, out } => {
            let config = Utf8PathBuf::from(config.unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string()));
            cmd_build(&config, out.as_deref()).await
        }
        CliCommand::Server { address } => {
            cmd_server(address.as_deref().unwrap_or(DEFAULT_ADDRESS)).await
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    Ok(Utf8PathBuf::try_from(std::env::current_dir()?)?)
}

async fn cmd_build(config_path: &Utf8Path, out: Option<&str>) -> Result<()> {
    let config = Config::from_path(config_path)?;
    logging::init_build(&config.log);

    let cwd = current_dir()?;
    let output = match out {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };

    let temp_dir = velox_io::temp_dir()?;
    let leaf = velox_io::unique_scratch_name();
    let request = config.build_request(&leaf);
    tracing::info!(
        config = %config_path,
        output = %output,
        fingerprint = %velox_cache::fingerprint(&request),
        "starting build"
    );

    let result = build_locally(&config, &temp_dir, &leaf, &output).await;

    let scratch = temp_dir.join(&leaf);
    if let Err(e) = velox_io::remove_dir_all_if_exists(&scratch).await {
        tracing::warn!(path = %scratch, error = %e, "failed to remove scratch directory");
    }

    let binary = result?;
    println!("{} {}", "Built".green().bold(), binary);
    Ok(())
}

async fn build_locally(
    config: &Config,
    temp_dir: &Utf8Path,
    leaf: &str,
    output: &Utf8Path,
) -> Result<Utf8PathBuf> {
    let fetcher = ArchiveFetcher::new(Arc::new(ArchiveCache::new()), config.github_token.clone())?;
    let root = fetcher
        .download_archive(temp_dir, leaf, &config.server_ref)
        .await?;

    let mut host = HostRouter::new(GitHubHost::new(config.github_token.clone())?);
    if let Some(gitlab) = &config.gitlab {
        host = host.with_gitlab(GitLabHost::new(gitlab.endpoint.clone(), gitlab.token.clone())?);
    }

    let requests = config
        .plugins
        .iter()
        .map(|p| {
            PluginRequest::new(&p.module_name, &p.tag)
                .with_name(&p.name)
                .with_replace(p.replace.clone())
        })
        .collect();
    let modules = velox_resolver::resolve_all(Arc::new(host), requests).await?;

    // native fields stay empty so the toolchain picks the host
    let target = &config.target_platform;
    let goos = target.os.clone().unwrap_or_default();
    let goarch = target.arch.clone().unwrap_or_default();

    let toolchain = GoToolchain::new();
    let binary = Builder::new(root, &toolchain)
        .with_plugins(modules)
        .with_output_dir(output, OutputPolicy::Keep)
        .with_server_ref(&config.server_ref)
        .with_debug(config.debug)
        .with_target(goos, goarch)
        .with_cleanup_dir(temp_dir)
        .build()
        .await?;
    Ok(binary)
}

async fn cmd_server(address: &str) -> Result<()> {
    logging::init_server();

    let endpoint = Endpoint::parse(address)?;
    let temp_dir = velox_io::temp_dir()?;
    velox_server::startup_sweep(&temp_dir).await;

    let token = std::env::var(GITHUB_TOKEN_ENV).ok();
    let fetcher = ArchiveFetcher::new(Arc::new(ArchiveCache::new()), token.clone())?;
    let host = HostRouter::new(GitHubHost::new(token)?);
    let server = BuildServer::new(fetcher, host, GoToolchain::new(), ServerOptions::new(temp_dir));

    let reaper = server.spawn_reaper(REAPER_INTERVAL);
    let listener = Listener::bind(&endpoint).await?;

    let result = tokio::select! {
        result = velox_server::serve(server, listener) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };
    reaper.abort();
    result
}
