//! Generation of the two files that wire plugins into a RoadRunner server:
//! the `go.mod` manifest and `container/plugins.go`.
//!
//! Output depends on the server's major version ([`Variant`]), which selects
//! the toolchain minimum, the baseline dependencies and the curated exclude
//! list.

mod entry;
mod render;
mod variant;


pub use entry::{IDENTIFIER_LEN, PLUGIN_TYPE, TemplateEntry, fresh_identifiers, random_identifier};
pub use render::{Rendered, render, render_manifest, render_registration, render_with_replaces};
pub use variant::{UMBRELLA_MODULE, Variant};

use velox_proto::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid server reference {reference:?}: expected `master` or a semantic version")]
    InvalidServerReference { reference: String },

    #[error("unknown server variant {major} (supported: v2, v2023, v2024, v2025)")]
    UnknownVariant { major: String },
}

impl TemplateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TemplateError::InvalidServerReference { .. } => ErrorKind::InvalidServerReference,
            TemplateError::UnknownVariant { .. } => ErrorKind::UnknownVariant,
        }
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
