use camino::{Utf8Path, Utf8PathBuf};

use crate::{BuildError, Result};

/// `rr.exe` for Windows targets, `rr` otherwise
pub fn executable_name(goos: &str) -> &'static str {
    if goos.eq_ignore_ascii_case("windows") {
        "rr.exe"
    } else {
        "rr"
    }
}

pub fn home_dir() -> Result<Utf8PathBuf> {
    let home = dirs::home_dir().ok_or(BuildError::NoHomeDirectory)?;
    Utf8PathBuf::from_path_buf(home).map_err(|_| BuildError::NoHomeDirectory)
}

/// `<home>/go[/<os>][/<arch>]`, so cross-compiles keep separate module
/// and build caches.
pub fn gopath(home: &Utf8Path, goos: &str, goarch: &str) -> Utf8PathBuf {
    let mut path = home.join("go");
    for segment in [goos, goarch] {
        if !segment.is_empty() {
            path.push(segment);
        }
    }
    path
}

/// Variables set on every toolchain invocation
pub fn toolchain_env(home: &Utf8Path, goos: &str, goarch: &str) -> Vec<(String, String)> {
    let gopath = gopath(home, goos, goarch);
    let mut env = vec![("CGO_ENABLED".to_string(), "0".to_string())];
    if !goos.is_empty() {
        env.push(("GOOS".to_string(), goos.to_string()));
    }
    if !goarch.is_empty() {
        env.push(("GOARCH".to_string(), goarch.to_string()));
    }
    env.push(("GOCACHE".to_string(), gopath.join("go-build").to_string()));
    env.push(("GOPATH".to_string(), gopath.to_string()));
    env
}
