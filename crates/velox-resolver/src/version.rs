use jiff::Timestamp;
use velox_host::is_major_suffix;

use crate::SHORT_SHA_LEN;

/// The version written next to a module in the generated `go.mod`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDescriptor {
    /// `vX.Y.Z`
    Tag(String),
    /// `vN.0.0-YYYYMMDDhhmmss-<sha12>`
    Pseudo(String),
    Latest,
}

impl VersionDescriptor {
    pub fn as_str(&self) -> &str {
        match self {
            VersionDescriptor::Tag(v) | VersionDescriptor::Pseudo(v) => v,
            VersionDescriptor::Latest => "latest",
        }
    }
}

impl std::fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `vX.Y.Z` with optional pre-release or build suffix
pub fn is_version_tag(reference: &str) -> bool {
    let Some(version) = reference.strip_prefix('v') else {
        return false;
    };
    let core = version.split(['-', '+']).next().unwrap_or_default();
    let segments: Vec<&str> = core.split('.').collect();
    segments.len() == 3
        && segments
            .iter()
            .all(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
}

/// `vN` when the module path ends in `/vN` with N > 0, otherwise `v0`.
pub fn major_of(module: &str) -> &str {
    let Some((_, last)) = module.rsplit_once('/') else {
        return "v0";
    };
    if is_major_suffix(last) && last[1..].bytes().any(|b| b != b'0') {
        last
    } else {
        "v0"
    }
}

/// Go pseudo-version for a commit. Missing time and SHA degrade to the
/// zero time and an empty hash.
pub fn pseudo_version(module: &str, timestamp: Option<Timestamp>, sha: &str) -> String {
    let time = match timestamp {
        Some(ts) => ts.strftime("%Y%m%d%H%M%S").to_string(),
        None => "00010101000000".to_string(),
    };
    let short = sha.get(..SHORT_SHA_LEN).unwrap_or(sha);
    format!("{}.0.0-{}-{}", major_of(module), time, short)
}
