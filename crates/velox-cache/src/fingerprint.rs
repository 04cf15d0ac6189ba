use std::hash::Hasher;

use fnv::FnvHasher;
use velox_proto::BuildRequest;

/// Bump when the fingerprint input format changes.
pub const FINGERPRINT_VERSION: u32 = 1;

/// FNV-1a 64 digest of a build request, rendered as lowercase hex.
///
/// Also used as the scratch directory name under the system temp dir.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a build request.
///
/// Inputs, in order:
/// - server reference
/// - target os and arch (empty when absent)
/// - each plugin as module, tag and replace, in request order
///
/// The request id and the force-rebuild flag are not part of it.
pub fn fingerprint(request: &BuildRequest) -> Fingerprint {
    let mut hasher = FnvHasher::default();

    hasher.write(b"velox-fingerprint-v");
    hasher.write(&FINGERPRINT_VERSION.to_le_bytes());
    hasher.write(b"\n");

    hasher.write(b"server_ref:");
    hasher.write(request.server_ref.as_bytes());
    hasher.write(b"\n");

    let (os, arch) = request
        .target_platform
        .as_ref()
        .map(|p| (p.os.as_str(), p.arch.as_str()))
        .unwrap_or(("", ""));

    hasher.write(b"os:");
    hasher.write(os.as_bytes());
    hasher.write(b"\n");

    hasher.write(b"arch:");
    hasher.write(arch.as_bytes());
    hasher.write(b"\n");

    // order is significant: it is the registration order
    for plugin in &request.plugins {
        hasher.write(b"plugin:");
        hasher.write(plugin.module_name.as_bytes());
        hasher.write(b"\0");
        hasher.write(plugin.tag.as_bytes());
        hasher.write(b"\0");
        hasher.write(plugin.replace.as_deref().unwrap_or("").as_bytes());
        hasher.write(b"\n");
    }

    Fingerprint(format!("{:016x}", hasher.finish()))
}
