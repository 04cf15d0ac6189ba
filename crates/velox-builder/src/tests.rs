use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;
use velox_proto::ErrorKind;
use velox_resolver::{ResolvedModule, VersionDescriptor};

use super::*;

/// Records commands; `build` drops a fake executable at its `-o` path.
#[derive(Default)]
struct FakeRunner {
    commands: Mutex<Vec<ToolCommand>>,
    fail_on: Option<&'static str>,
}

impl FakeRunner {
    fn failing_on(subcommand: &'static str) -> Self {
        Self {
            fail_on: Some(subcommand),
            ..Default::default()
        }
    }

    fn commands(&self) -> Vec<ToolCommand> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, command: &ToolCommand, log: &BuildLog) -> Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        log.append_line(&format!("ran {command}"));

        let last = command.args.last().map(String::as_str).unwrap_or_default();
        if self.fail_on == Some(last) || self.fail_on == command.args.first().map(String::as_str) {
            return Err(BuildError::Toolchain {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                log: log.contents(),
            });
        }

        if let Some(output) = command.arg_after("-o") {
            std::fs::write(output, b"\x7fELF fake").unwrap();
        }
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    base: Utf8PathBuf,
    root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let root = base.join("scratch/roadrunner-server-master");
        std::fs::create_dir_all(root.join("container")).unwrap();
        std::fs::create_dir_all(root.join("cmd/rr")).unwrap();
        std::fs::write(root.join(REGISTRATION_FILE), "package container // stock\n").unwrap();
        std::fs::write(root.join(MANIFEST_FILE), "module stock\n").unwrap();
        std::fs::create_dir_all(base.join("home")).unwrap();
        std::fs::create_dir_all(base.join("tmp")).unwrap();
        Self {
            _dir: dir,
            base,
            root,
        }
    }

    fn builder<'r>(&self, runner: &'r FakeRunner) -> Builder<'r, FakeRunner> {
        Builder::new(&self.root, runner)
            .with_plugins(vec![logger()])
            .with_home_dir(self.base.join("home"))
            .with_cleanup_dir(self.base.join("tmp"))
            .with_build_time("2025-01-02T03:04:05Z".parse::<Timestamp>().unwrap())
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root.join(relative)).unwrap()
    }
}

fn logger() -> ResolvedModule {
    ResolvedModule {
        name: "logger".to_string(),
        module: "github.com/roadrunner-server/logger/v5".to_string(),
        version: VersionDescriptor::Tag("v5.1.8".to_string()),
        replace: None,
    }
}

fn build_command(runner: &FakeRunner) -> ToolCommand {
    runner
        .commands()
        .into_iter()
        .find(|c| c.args.first().map(String::as_str) == Some("build"))
        .unwrap()
}

#[tokio::test]
async fn runs_download_tidy_build_in_order() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();

    let path = fx.builder(&runner).build().await.unwrap();

    let commands = runner.commands();
    let subcommands: Vec<String> = commands.iter().map(|c| c.args[..2].join(" ")).collect();
    assert_eq!(subcommands, ["mod download", "mod tidy", "build -v"]);
    for command in &commands {
        assert_eq!(command.cwd, fx.root);
    }
    assert_eq!(path, fx.root.join("rr"));
    assert!(path.exists());
}

#[tokio::test]
async fn generated_files_replace_stock_ones() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();

    fx.builder(&runner).build().await.unwrap();

    let manifest = fx.read(MANIFEST_FILE);
    assert!(manifest.starts_with("module github.com/roadrunner-server/roadrunner/v2025\n"));
    assert!(manifest.contains("\tgithub.com/roadrunner-server/logger/v5 v5.1.8\n"));

    let registration = fx.read(REGISTRATION_FILE);
    assert!(!registration.contains("stock"));
    assert!(registration.contains("\"github.com/roadrunner-server/logger/v5\""));
}

#[tokio::test]
async fn toolchain_env_is_applied_to_every_command() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();

    fx.builder(&runner)
        .with_target("linux", "arm64")
        .build()
        .await
        .unwrap();

    let gopath = fx.base.join("home/go/linux/arm64");
    for command in runner.commands() {
        assert_eq!(command.env_var("CGO_ENABLED"), Some("0"));
        assert_eq!(command.env_var("GOOS"), Some("linux"));
        assert_eq!(command.env_var("GOARCH"), Some("arm64"));
        assert_eq!(command.env_var("GOPATH"), Some(gopath.as_str()));
        assert_eq!(
            command.env_var("GOCACHE"),
            Some(gopath.join("go-build").as_str())
        );
    }
}

#[tokio::test]
async fn release_build_strips_and_stamps_in_one_ldflags() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();

    fx.builder(&runner)
        .with_server_ref("v2024.3.1")
        .build()
        .await
        .unwrap();

    let build = build_command(&runner);
    let meta = "github.com/roadrunner-server/roadrunner/v2024/internal/meta";
    assert_eq!(
        build.arg_after("-ldflags"),
        Some(
            format!("-s -X {meta}.version=v2024.3.1 -X {meta}.buildTime=2025-01-02T03:04:05Z")
                .as_str()
        )
    );
    assert_eq!(build.args.iter().filter(|a| *a == "-ldflags").count(), 1);
    assert!(!build.args.iter().any(|a| a == "-gcflags"));
    assert_eq!(build.args.last().map(String::as_str), Some(ENTRYPOINT));
    assert_eq!(build.arg_after("-o"), Some(fx.root.join("rr").as_str()));
}

#[tokio::test]
async fn debug_build_keeps_symbols() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();

    fx.builder(&runner).with_debug(true).build().await.unwrap();

    let build = build_command(&runner);
    let args = build.args.join(" ");
    assert!(args.starts_with("build -v -trimpath -gcflags -N -gcflags -l -tags debug -ldflags"));
    let ldflags = build.arg_after("-ldflags").unwrap();
    assert!(ldflags.starts_with("-X "));
}

#[tokio::test]
async fn windows_target_produces_exe() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();
    let out = fx.base.join("out");

    let path = fx
        .builder(&runner)
        .with_target("windows", "amd64")
        .with_output_dir(&out, OutputPolicy::Keep)
        .build()
        .await
        .unwrap();

    assert_eq!(path, out.join("rr.exe"));
    assert_eq!(
        build_command(&runner).arg_after("-o"),
        Some(fx.root.join("rr.exe").as_str())
    );
}

#[tokio::test]
async fn no_plugins_touches_nothing() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();

    let err = fx
        .builder(&runner)
        .with_plugins(Vec::new())
        .build()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NoPluginsConfigured);
    assert!(runner.commands().is_empty());
    assert_eq!(fx.read(MANIFEST_FILE), "module stock\n");
}

#[tokio::test]
async fn invalid_server_ref_fails_before_writing() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();

    let err = fx
        .builder(&runner)
        .with_server_ref("not-a-version")
        .build()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidServerReference);
    assert!(runner.commands().is_empty());
    assert_eq!(fx.read(MANIFEST_FILE), "module stock\n");
}

#[tokio::test]
async fn failing_tidy_stops_the_build() {
    let fx = Fixture::new();
    let runner = FakeRunner::failing_on("tidy");

    let err = fx.builder(&runner).build().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ToolchainFailed);
    assert!(err.to_string().contains("ran go mod tidy"));
    assert_eq!(runner.commands().len(), 2);
    assert!(!fx.root.join("rr").exists());
}

#[tokio::test]
async fn missing_stock_file_is_an_io_failure() {
    let fx = Fixture::new();
    std::fs::remove_file(fx.root.join(REGISTRATION_FILE)).unwrap();
    let runner = FakeRunner::default();

    let err = fx.builder(&runner).build().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IoFailed);
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn clean_policy_empties_output_dir() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();
    let out = fx.base.join("bin");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("stale"), "old").unwrap();

    let path = fx
        .builder(&runner)
        .with_output_dir(&out, OutputPolicy::Clean)
        .build()
        .await
        .unwrap();

    assert!(!out.join("stale").exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"\x7fELF fake");
}

#[tokio::test]
async fn keep_policy_leaves_neighbours_and_replaces_rr() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();
    let out = fx.base.join("project");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("velox.toml"), "[roadrunner]\n").unwrap();
    std::fs::write(out.join("rr"), "previous").unwrap();

    let path = fx
        .builder(&runner)
        .with_output_dir(&out, OutputPolicy::Keep)
        .build()
        .await
        .unwrap();

    assert!(out.join("velox.toml").exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"\x7fELF fake");
}

#[cfg(unix)]
#[tokio::test]
async fn copied_binary_keeps_exec_bit() {
    use std::os::unix::fs::PermissionsExt;

    struct ExecRunner;
    impl CommandRunner for ExecRunner {
        async fn run(&self, command: &ToolCommand, _log: &BuildLog) -> Result<()> {
            if let Some(output) = command.arg_after("-o") {
                std::fs::write(output, b"bin").unwrap();
                std::fs::set_permissions(output, std::fs::Permissions::from_mode(0o755)).unwrap();
            }
            Ok(())
        }
    }

    let fx = Fixture::new();
    let out = fx.base.join("out");
    let path = Builder::new(&fx.root, &ExecRunner)
        .with_plugins(vec![logger()])
        .with_home_dir(fx.base.join("home"))
        .with_cleanup_dir(fx.base.join("tmp"))
        .with_output_dir(&out, OutputPolicy::Clean)
        .build()
        .await
        .unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[tokio::test]
async fn cleanup_runs_after_success_and_failure() {
    let fx = Fixture::new();
    let tmp = fx.base.join("tmp");

    for runner in [FakeRunner::default(), FakeRunner::failing_on("build")] {
        std::fs::create_dir_all(tmp.join("roadrunner-server-v2025.1.0")).unwrap();
        std::fs::write(tmp.join("roadrunner-server.zip"), "x").unwrap();
        std::fs::create_dir_all(tmp.join("unrelated")).unwrap();

        let _ = fx.builder(&runner).build().await;

        assert!(!tmp.join("roadrunner-server-v2025.1.0").exists());
        assert!(!tmp.join("roadrunner-server.zip").exists());
        assert!(tmp.join("unrelated").exists());
    }
}

#[tokio::test]
async fn single_level_replace_by_default() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();
    let local = fx.base.join("src/logger");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::write(
        local.join("go.mod"),
        "module github.com/roadrunner-server/logger/v5\n\nreplace github.com/x/a => ../a\n",
    )
    .unwrap();

    let mut plugin = logger();
    plugin.replace = Some(local.to_string());
    fx.builder(&runner)
        .with_server_ref("v2024.3.1")
        .with_plugins(vec![plugin])
        .build()
        .await
        .unwrap();

    let manifest = fx.read(MANIFEST_FILE);
    assert!(manifest.contains(&format!("\tgithub.com/roadrunner-server/logger/v5 => {local}\n")));
    assert!(!manifest.contains("github.com/x/a"));
}

#[tokio::test]
async fn transitive_replace_lifts_nested_directives() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();
    let local = fx.base.join("src/logger");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::write(
        local.join("go.mod"),
        "module github.com/roadrunner-server/logger/v5\n\nreplace github.com/x/a => ../a\n",
    )
    .unwrap();

    let mut plugin = logger();
    plugin.replace = Some(local.to_string());
    fx.builder(&runner)
        .with_server_ref("v2024.3.1")
        .with_plugins(vec![plugin])
        .with_transitive_replace(true)
        .build()
        .await
        .unwrap();

    let manifest = fx.read(MANIFEST_FILE);
    assert!(manifest.contains(&format!("\tgithub.com/x/a => {}\n", local.join("../a"))));
}

#[tokio::test]
async fn transitive_replace_keeps_a_plugins_own_replace() {
    let fx = Fixture::new();
    let runner = FakeRunner::default();
    let local = fx.base.join("src/logger");
    std::fs::create_dir_all(&local).unwrap();
    std::fs::write(
        local.join("go.mod"),
        "module github.com/roadrunner-server/logger/v5\n\n\
         replace github.com/x/a v1.0.0 => ../a\n\
         replace github.com/x/b => ../b\n",
    )
    .unwrap();

    let mut plugin = logger();
    plugin.replace = Some(local.to_string());
    let sibling = ResolvedModule {
        name: "a".to_string(),
        module: "github.com/x/a".to_string(),
        version: VersionDescriptor::Tag("v1.0.0".to_string()),
        replace: Some("/own/a".to_string()),
    };
    fx.builder(&runner)
        .with_server_ref("v2024.3.1")
        .with_plugins(vec![plugin, sibling])
        .with_transitive_replace(true)
        .build()
        .await
        .unwrap();

    let manifest = fx.read(MANIFEST_FILE);
    assert!(manifest.contains("\tgithub.com/x/a => /own/a\n"));
    assert!(!manifest.contains("github.com/x/a v1.0.0 =>"));
    assert!(manifest.contains(&format!("\tgithub.com/x/b => {}\n", local.join("../b"))));
}

#[tokio::test]
async fn shared_log_survives_failure() {
    let fx = Fixture::new();
    let runner = FakeRunner::failing_on("download");
    let log = BuildLog::new();

    let _ = fx.builder(&runner).with_log(log.clone()).build().await;

    assert_eq!(log.contents(), "ran go mod download\n");
}

#[test]
fn toolchain_error_quotes_the_log_tail() {
    let log: String = (0..30).map(|i| format!("line {i}\n")).collect();
    let err = BuildError::Toolchain {
        command: "go build".to_string(),
        status: "exit status: 2".to_string(),
        log,
    };
    let message = err.to_string();
    assert!(message.starts_with("`go build` failed with exit status: 2\n"));
    assert!(message.contains("line 29"));
    assert!(message.contains("line 10"));
    assert!(!message.contains("line 9\n"));
}

#[cfg(unix)]
mod go_toolchain {
    use super::*;

    fn tmp() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        (dir, path)
    }

    #[tokio::test]
    async fn streams_both_outputs_into_the_log() {
        let (_dir, cwd) = tmp();
        let runner = GoToolchain::with_program("sh");
        let log = BuildLog::new();
        let command = ToolCommand::new(["-c", "echo out-$VELOX_PROBE; echo err >&2; pwd"], cwd.clone())
            .with_env(vec![("VELOX_PROBE".to_string(), "ok".to_string())]);

        runner.run(&command, &log).await.unwrap();

        let contents = log.contents();
        assert!(contents.contains("out-ok\n"));
        assert!(contents.contains("err\n"));
        let canonical = std::fs::canonicalize(&cwd).unwrap();
        assert!(contents.contains(canonical.to_str().unwrap()));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_toolchain_failure() {
        let (_dir, cwd) = tmp();
        let runner = GoToolchain::with_program("sh");
        let log = BuildLog::new();
        let command = ToolCommand::new(["-c", "echo broken; exit 3"], cwd);

        let err = runner.run(&command, &log).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ToolchainFailed);
        let BuildError::Toolchain { status, log, .. } = err else {
            panic!("expected a toolchain error");
        };
        assert!(status.contains('3'));
        assert_eq!(log, "broken\n");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let (_dir, cwd) = tmp();
        let runner = GoToolchain::with_program("velox-definitely-not-installed");
        let err = runner
            .run(&ToolCommand::new(["version"], cwd), &BuildLog::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }
}
