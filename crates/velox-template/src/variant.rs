use crate::{Result, TemplateError};

/// Root module path of the RoadRunner server; variants append `/<major>`.
pub const UMBRELLA_MODULE: &str = "github.com/roadrunner-server/roadrunner";

/// Server major versions velox knows how to generate files for.
///
/// Closed set: a new server major is a new variant, existing variants do
/// not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    V2,
    V2023,
    V2024,
    V2025,
}

impl Variant {
    pub const ALL: [Variant; 4] = [Variant::V2, Variant::V2023, Variant::V2024, Variant::V2025];

    /// Variant built from the default branch
    pub fn latest() -> Self {
        Variant::V2025
    }

    /// `master` maps to the latest variant; anything else must parse as a
    /// semantic version whose first segment names a known major.
    pub fn from_server_ref(reference: &str) -> Result<Self> {
        if reference == "master" {
            return Ok(Self::latest());
        }

        let major = leading_segment(reference).ok_or_else(|| {
            TemplateError::InvalidServerReference {
                reference: reference.to_string(),
            }
        })?;

        Self::from_major(&format!("v{major}"))
    }

    pub fn from_major(major: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.major() == major)
            .ok_or_else(|| TemplateError::UnknownVariant {
                major: major.to_string(),
            })
    }

    pub fn major(self) -> &'static str {
        match self {
            Variant::V2 => "v2",
            Variant::V2023 => "v2023",
            Variant::V2024 => "v2024",
            Variant::V2025 => "v2025",
        }
    }

    /// `github.com/roadrunner-server/roadrunner/<major>`
    pub fn umbrella_module(self) -> String {
        format!("{UMBRELLA_MODULE}/{}", self.major())
    }

    /// Package whose `version` and `buildTime` vars are stamped via ldflags
    pub fn meta_package(self) -> String {
        format!("{}/internal/meta", self.umbrella_module())
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.major())
    }
}

/// First numeric segment of a version like `v2024.1.0`, `2.12.3-rc.1` or
/// `v2025.1`. Returns `None` for anything that is not a version.
fn leading_segment(reference: &str) -> Option<u64> {
    let version = reference.strip_prefix('v').unwrap_or(reference);
    let core = version.split(['-', '+']).next()?;
    if core.is_empty() {
        return None;
    }

    // pre-release and build metadata may only follow a numeric core
    let suffix = &version[core.len()..];
    if let Some(rest) = suffix.get(1..) {
        if rest.is_empty() {
            return None;
        }
    }

    let mut segments = core.split('.');
    let first = segments.next()?;
    let all_numeric = std::iter::once(first)
        .chain(segments)
        .all(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
    if !all_numeric {
        return None;
    }

    first.parse().ok()
}
