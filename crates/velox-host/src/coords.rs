use crate::{HostError, Result};

/// Where a Go module lives on its source host.
///
/// Module paths look like `host/owner/repo[/folder...][/vN]`. A trailing
/// major-version suffix is part of the module name, not a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub host: String,
    pub owner: String,
    pub repo: String,
    /// Directory holding `go.mod`, relative to the repository root; empty for the root
    pub folder: String,
}

impl RepoCoordinates {
    pub fn from_module_path(module: &str) -> Result<Self> {
        let invalid = || HostError::InvalidModulePath {
            module: module.to_string(),
        };

        let mut segments: Vec<&str> = module.trim_end_matches('/').split('/').collect();
        if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        if segments.len() > 3 && segments.last().is_some_and(|s| is_major_suffix(s)) {
            segments.pop();
        }

        Ok(Self {
            host: segments[0].to_string(),
            owner: segments[1].to_string(),
            repo: segments[2].to_string(),
            folder: segments[3..].join("/"),
        })
    }

    /// Path of the module's `go.mod` inside the repository
    pub fn manifest_path(&self) -> String {
        if self.folder.is_empty() {
            "go.mod".to_string()
        } else {
            format!("{}/go.mod", self.folder)
        }
    }
}

/// `v` followed by digits only, e.g. `v2`, `v2025`
pub fn is_major_suffix(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}
