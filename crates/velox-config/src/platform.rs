use velox_proto::Platform;

/// Value that selects the host platform
pub const NATIVE: &str = "native";

/// `[target_platform]`; absent or `native` fields follow the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPlatform {
    pub os: Option<String>,
    pub arch: Option<String>,
}

impl TargetPlatform {
    pub fn new(os: Option<String>, arch: Option<String>) -> Self {
        let explicit = |v: Option<String>| v.filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(NATIVE));
        Self {
            os: explicit(os),
            arch: explicit(arch),
        }
    }

    pub fn is_native(&self) -> bool {
        self.os.is_none() && self.arch.is_none()
    }

    /// Concrete `(os, arch)` in Go naming.
    pub fn resolve(&self) -> Platform {
        let host = host_platform();
        Platform {
            os: self.os.clone().unwrap_or(host.os),
            arch: self.arch.clone().unwrap_or(host.arch),
        }
    }

    /// The platform to put in a request, `None` when fully native.
    pub fn requested(&self) -> Option<Platform> {
        (!self.is_native()).then(|| self.resolve())
    }
}

/// The running host, in Go naming.
pub fn host_platform() -> Platform {
    Platform::new(
        go_os(std::env::consts::OS),
        go_arch(std::env::consts::ARCH),
    )
}

/// Go `GOOS` for a Rust `target_os`
pub fn go_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Go `GOARCH` for a Rust `target_arch`
pub fn go_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}
