//! The build driver.
//!
//! Given an unpacked server template and a list of resolved plugins,
//! [`Builder::build`] rewrites the two generated files, syncs modules,
//! compiles `cmd/rr/main.go` and copies the executable out.

mod command;
mod env;
mod error;
mod log;
mod replace;

#[cfg(test)]
mod tests;

pub use command::{CommandRunner, GoToolchain, ToolCommand};
pub use env::{executable_name, gopath, home_dir, toolchain_env};
pub use error::{BuildError, Result};
pub use log::BuildLog;
pub use replace::{is_local_path, module_path, replace_directives};

use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use velox_resolver::ResolvedModule;
use velox_template::{TemplateEntry, Variant};

/// Registration file, relative to the template root
pub const REGISTRATION_FILE: &str = "container/plugins.go";
/// Module manifest, relative to the template root
pub const MANIFEST_FILE: &str = "go.mod";
pub const ENTRYPOINT: &str = "cmd/rr/main.go";
/// Scratch entries left in the temp directory start with this
pub const CLEANUP_PREFIX: &str = "roadrunner-server";

/// What to do with an output directory that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Remove it and recreate it empty
    Clean,
    /// Create it if missing, leave existing contents alone
    Keep,
}

pub struct Builder<'r, R: CommandRunner> {
    template_root: Utf8PathBuf,
    runner: &'r R,
    modules: Vec<ResolvedModule>,
    output: Option<(Utf8PathBuf, OutputPolicy)>,
    server_ref: String,
    debug: bool,
    goos: String,
    goarch: String,
    log: BuildLog,
    transitive_replace: bool,
    home_dir: Option<Utf8PathBuf>,
    cleanup_dir: Option<Utf8PathBuf>,
    build_time: Option<Timestamp>,
}

impl<'r, R: CommandRunner> Builder<'r, R> {
    /// `template_root` is the unpacked `roadrunner-server-<ref>` directory.
    pub fn new(template_root: impl Into<Utf8PathBuf>, runner: &'r R) -> Self {
        Self {
            template_root: template_root.into(),
            runner,
            modules: Vec::new(),
            output: None,
            server_ref: "master".to_string(),
            debug: false,
            goos: String::new(),
            goarch: String::new(),
            log: BuildLog::new(),
            transitive_replace: false,
            home_dir: None,
            cleanup_dir: None,
            build_time: None,
        }
    }

    pub fn with_plugins(mut self, modules: Vec<ResolvedModule>) -> Self {
        self.modules = modules;
        self
    }

    /// Defaults to the template root itself with [`OutputPolicy::Keep`].
    pub fn with_output_dir(mut self, dir: impl Into<Utf8PathBuf>, policy: OutputPolicy) -> Self {
        self.output = Some((dir.into(), policy));
        self
    }

    pub fn with_server_ref(mut self, server_ref: impl Into<String>) -> Self {
        self.server_ref = server_ref.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Go names; empty strings build for the host.
    pub fn with_target(mut self, goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        self.goos = goos.into();
        self.goarch = goarch.into();
        self
    }

    /// Share a log with the caller so output survives a failed build.
    pub fn with_log(mut self, log: BuildLog) -> Self {
        self.log = log;
        self
    }

    /// Lift `replace` directives from locally replaced plugins into the
    /// generated manifest.
    pub fn with_transitive_replace(mut self, enabled: bool) -> Self {
        self.transitive_replace = enabled;
        self
    }

    pub fn with_home_dir(mut self, home: impl Into<Utf8PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    /// Directory swept for [`CLEANUP_PREFIX`] entries once the build ends.
    /// Defaults to the system temp directory.
    pub fn with_cleanup_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cleanup_dir = Some(dir.into());
        self
    }

    /// Pin the embedded build time instead of using the current instant.
    pub fn with_build_time(mut self, time: Timestamp) -> Self {
        self.build_time = Some(time);
        self
    }

    pub fn log(&self) -> &BuildLog {
        &self.log
    }

    /// Run every step and return the path of the copied executable.
    pub async fn build(self) -> Result<Utf8PathBuf> {
        let result = self.run_steps().await;
        self.sweep().await;
        result
    }

    async fn run_steps(&self) -> Result<Utf8PathBuf> {
        if self.modules.is_empty() {
            return Err(BuildError::NoPluginsConfigured);
        }
        let variant = Variant::from_server_ref(&self.server_ref)?;
        let home = match &self.home_dir {
            Some(home) => home.clone(),
            None => home_dir()?,
        };

        let root = &self.template_root;
        tracing::info!(
            root = %root,
            server_ref = %self.server_ref,
            variant = %variant,
            plugins = self.modules.len(),
            "building roadrunner"
        );

        let entries = self.entries();
        let extra = if self.transitive_replace {
            self.lifted_replaces().await?
        } else {
            Vec::new()
        };
        let rendered = velox_template::render_with_replaces(variant, &entries, &extra);

        self.replace_file(REGISTRATION_FILE, &rendered.registration)
            .await?;
        self.replace_file(MANIFEST_FILE, &rendered.manifest).await?;

        let env = toolchain_env(&home, &self.goos, &self.goarch);
        for args in [["mod", "download"], ["mod", "tidy"]] {
            let command = ToolCommand::new(args, root.clone()).with_env(env.clone());
            self.runner.run(&command, &self.log).await?;
        }

        let (output_dir, policy) = match &self.output {
            Some((dir, policy)) => (dir.clone(), *policy),
            None => (root.clone(), OutputPolicy::Keep),
        };
        prepare_output_dir(&output_dir, policy).await?;

        let exe = executable_name(&self.goos);
        let built = root.join(exe);
        let command =
            ToolCommand::new(self.build_args(variant, &built), root.clone()).with_env(env);
        self.runner.run(&command, &self.log).await?;

        if !tokio::fs::try_exists(&built).await.unwrap_or(false) {
            return Err(BuildError::MissingBinary { path: built });
        }

        let dest = output_dir.join(exe);
        if dest != built {
            velox_io::copy_preserving_mode(&built, &dest)
                .await
                .map_err(BuildError::io(&dest))?;
        }
        tracing::info!(path = %dest, "build finished");
        Ok(dest)
    }

    fn entries(&self) -> Vec<TemplateEntry> {
        let aliases = velox_template::fresh_identifiers(self.modules.len());
        self.modules
            .iter()
            .zip(aliases)
            .map(|(m, alias)| {
                TemplateEntry::new(&m.module, alias, m.version.as_str(), m.replace.clone())
            })
            .collect()
    }

    async fn lifted_replaces(&self) -> Result<Vec<(String, String)>> {
        let mut lifted: Vec<(String, String)> = Vec::new();
        for module in &self.modules {
            let Some(target) = module.replace.as_deref().filter(|t| is_local_path(t)) else {
                continue;
            };
            let base = Utf8Path::new(target);
            let manifest_path = base.join(MANIFEST_FILE);
            let manifest = match tokio::fs::read_to_string(&manifest_path).await {
                Ok(manifest) => manifest,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(plugin = %module.name, path = %manifest_path, "replacement has no go.mod");
                    continue;
                }
                Err(e) => return Err(BuildError::io(&manifest_path)(e)),
            };
            for (from, to) in replace_directives(&manifest, base) {
                if lifted.iter().any(|(seen, _)| *seen == from) {
                    continue;
                }
                // a plugin's own replace wins over one lifted from a sibling
                let path = module_path(&from);
                if self.modules.iter().any(|m| m.replace.is_some() && m.module == path) {
                    tracing::debug!(plugin = %module.name, from = %from, "module already replaced");
                    continue;
                }
                tracing::debug!(plugin = %module.name, from = %from, to = %to, "lifting replace directive");
                lifted.push((from, to));
            }
        }
        Ok(lifted)
    }

    async fn replace_file(&self, relative: &str, contents: &[u8]) -> Result<()> {
        let path = self.template_root.join(relative);
        tokio::fs::remove_file(&path)
            .await
            .map_err(BuildError::io(&path))?;
        tracing::debug!(path = %path, "{}", String::from_utf8_lossy(contents));
        velox_io::atomic_write(&path, contents)
            .await
            .map_err(BuildError::io(&path))
    }

    fn build_args(&self, variant: Variant, output: &Utf8Path) -> Vec<String> {
        let meta = variant.meta_package();
        let time = self
            .build_time
            .unwrap_or_else(Timestamp::now)
            .strftime("%Y-%m-%dT%H:%M:%SZ");
        let stamp = format!(
            "-X {meta}.version={} -X {meta}.buildTime={time}",
            self.server_ref
        );

        let mut args: Vec<String> = ["build", "-v", "-trimpath"].map(String::from).into();
        let ldflags = if self.debug {
            args.extend(["-gcflags", "-N", "-gcflags", "-l", "-tags", "debug"].map(String::from));
            stamp
        } else {
            // separate -ldflags would override each other
            format!("-s {stamp}")
        };
        args.push("-ldflags".to_string());
        args.push(ldflags);
        args.push("-o".to_string());
        args.push(output.to_string());
        args.push(ENTRYPOINT.to_string());
        args
    }

    async fn sweep(&self) {
        let dir = match &self.cleanup_dir {
            Some(dir) => dir.clone(),
            None => match velox_io::temp_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    tracing::warn!(error = %e, "no temp directory to clean");
                    return;
                }
            },
        };
        velox_io::sweep_prefixed(&dir, CLEANUP_PREFIX).await;
    }
}

async fn prepare_output_dir(dir: &Utf8Path, policy: OutputPolicy) -> Result<()> {
    if policy == OutputPolicy::Clean && tokio::fs::metadata(dir).await.is_ok() {
        velox_io::remove_dir_all_if_exists(dir)
            .await
            .map_err(BuildError::io(dir))?;
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o777);
    builder.create(dir).await.map_err(BuildError::io(dir))
}
