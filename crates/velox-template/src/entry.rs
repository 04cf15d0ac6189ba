use std::collections::HashSet;

use rand::Rng;

/// Type every plugin module exports for registration
pub const PLUGIN_TYPE: &str = "Plugin{}";

pub const IDENTIFIER_LEN: usize = 5;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

// five-letter Go keywords, unusable as import aliases
const RESERVED: &[&str] = &["break", "const", "defer", "range"];

/// One plugin as both generated files see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// Go module path
    pub module: String,
    /// Import alias in `plugins.go`
    pub alias: String,
    /// Tag, pseudo-version or `latest`
    pub version: String,
    /// Replacement target for a `replace` directive
    pub replace: Option<String>,
    pub plugin_type: &'static str,
}

impl TemplateEntry {
    pub fn new(
        module: impl Into<String>,
        alias: impl Into<String>,
        version: impl Into<String>,
        replace: Option<String>,
    ) -> Self {
        Self {
            module: module.into(),
            alias: alias.into(),
            version: version.into(),
            replace: replace.filter(|r| !r.is_empty()),
            plugin_type: PLUGIN_TYPE,
        }
    }

    /// `alias "module"`
    pub fn import_line(&self) -> String {
        format!("{} \"{}\"", self.alias, self.module)
    }

    /// `module version`
    pub fn require_line(&self) -> String {
        format!("{} {}", self.module, self.version)
    }

    /// `&alias.Plugin{}`
    pub fn registration(&self) -> String {
        format!("&{}.{}", self.alias, self.plugin_type)
    }
}

/// Five letters drawn uniformly from `[a-zA-Z]`
pub fn random_identifier() -> String {
    let mut rng = rand::thread_rng();
    (0..IDENTIFIER_LEN)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// `count` distinct identifiers, none of them a Go keyword.
pub fn fresh_identifiers(count: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let id = random_identifier();
        if RESERVED.contains(&id.as_str()) || !seen.insert(id.clone()) {
            continue;
        }
        out.push(id);
    }
    out
}
