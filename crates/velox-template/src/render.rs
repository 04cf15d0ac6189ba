use std::fmt::Write;

use crate::{TemplateEntry, Variant};

/// Both generated files, ready to be written verbatim
#[derive(Debug, Clone)]
pub struct Rendered {
    /// `go.mod`
    pub manifest: Vec<u8>,
    /// `container/plugins.go`
    pub registration: Vec<u8>,
}

struct VariantSpec {
    go: &'static str,
    toolchain: Option<&'static str>,
    baseline: &'static [&'static str],
    excludes: &'static [&'static str],
    fixed_replaces: &'static [&'static str],
    plugin_replaces: bool,
    /// Major of the bundled informer and resetter plugins
    bundled_major: &'static str,
}

const V2: VariantSpec = VariantSpec {
    go: "1.20",
    toolchain: None,
    baseline: &[
        "github.com/buger/goterm v1.0.4",
        "github.com/dustin/go-humanize v1.0.1",
        "github.com/joho/godotenv v1.5.1",
        "github.com/olekukonko/tablewriter v0.0.5",
        "github.com/spf13/cobra v1.7.0",
        "github.com/spf13/viper v1.15.0",
        "github.com/stretchr/testify v1.8.2",
        "go.uber.org/automaxprocs v1.5.2",
    ],
    excludes: &[],
    fixed_replaces: &[],
    plugin_replaces: true,
    bundled_major: "v3",
};

const V2023: VariantSpec = VariantSpec {
    go: "1.21",
    toolchain: Some("go1.21.5"),
    baseline: &[
        "github.com/buger/goterm v1.0.4",
        "github.com/dustin/go-humanize v1.0.1",
        "github.com/joho/godotenv v1.5.1",
        "github.com/olekukonko/tablewriter v0.0.5",
        "github.com/spf13/cobra v1.8.0",
        "github.com/spf13/viper v1.18.2",
        "github.com/stretchr/testify v1.8.2",
        "go.uber.org/automaxprocs v1.5.2",
        "github.com/roadrunner-server/informer/v4 latest",
        "github.com/roadrunner-server/resetter/v4 latest",
        "github.com/roadrunner-server/config/v4 latest",
    ],
    excludes: &[
        "github.com/spf13/viper v1.18.0",
        "github.com/spf13/viper v1.18.1",
        "go.temporal.io/api v1.26.1",
    ],
    fixed_replaces: &[],
    plugin_replaces: true,
    bundled_major: "v4",
};

const V2024: VariantSpec = VariantSpec {
    go: "1.24",
    toolchain: None,
    baseline: &[
        "github.com/buger/goterm v1.0.4",
        "github.com/dustin/go-humanize v1.0.1",
        "github.com/fatih/color v1.17.0",
        "github.com/joho/godotenv v1.5.1",
        "github.com/olekukonko/tablewriter v0.0.5",
        "github.com/spf13/cobra v1.8.0",
        "github.com/spf13/viper v1.19.0",
        "github.com/stretchr/testify v1.9.0",
        "go.uber.org/automaxprocs v1.5.3",
        "github.com/roadrunner-server/informer/v4 latest",
        "github.com/roadrunner-server/resetter/v4 latest",
        "github.com/roadrunner-server/config/v4 latest",
    ],
    excludes: &[
        "github.com/spf13/viper v1.18.0",
        "github.com/spf13/viper v1.18.1",
        "github.com/uber-go/tally/v4 v4.1.11",
        "github.com/uber-go/tally/v4 v4.1.12",
        "go.temporal.io/api v1.26.1",
    ],
    fixed_replaces: &["github.com/uber-go/tally/v4 => github.com/uber-go/tally/v4 v4.1.10"],
    plugin_replaces: true,
    bundled_major: "v4",
};

const V2025: VariantSpec = VariantSpec {
    go: "1.25.2",
    toolchain: Some("go1.25.2"),
    baseline: &[
        "github.com/olekukonko/tablewriter v1.0.8",
        "github.com/buger/goterm v1.0.4",
        "github.com/dustin/go-humanize v1.0.1",
        "github.com/fatih/color v1.18.0",
        "github.com/joho/godotenv v1.5.1",
        "github.com/spf13/cobra v1.9.1",
        "github.com/spf13/viper v1.20.1",
        "github.com/stretchr/testify v1.10.0",
        "go.uber.org/automaxprocs v1.6.0",
        "github.com/roadrunner-server/informer/v5 latest",
        "github.com/roadrunner-server/resetter/v5 latest",
    ],
    excludes: &[
        "github.com/olekukonko/tablewriter v1.1.1",
        "github.com/redis/go-redis/v9 v9.15.0",
        "github.com/redis/go-redis/v9 v9.15.1",
        "github.com/spf13/viper v1.18.0",
        "github.com/spf13/viper v1.18.1",
        "go.temporal.io/api v1.26.1",
    ],
    fixed_replaces: &[],
    plugin_replaces: false,
    bundled_major: "v5",
};

fn spec(variant: Variant) -> &'static VariantSpec {
    match variant {
        Variant::V2 => &V2,
        Variant::V2023 => &V2023,
        Variant::V2024 => &V2024,
        Variant::V2025 => &V2025,
    }
}

pub fn render(variant: Variant, entries: &[TemplateEntry]) -> Rendered {
    render_with_replaces(variant, entries, &[])
}

/// Like [`render`], with additional `module => target` replace directives
/// that do not belong to any entry.
pub fn render_with_replaces(
    variant: Variant,
    entries: &[TemplateEntry],
    extra_replaces: &[(String, String)],
) -> Rendered {
    Rendered {
        manifest: manifest(variant, entries, extra_replaces).into_bytes(),
        registration: render_registration(variant, entries).into_bytes(),
    }
}

/// The `go.mod` for `variant` with one require line per entry.
pub fn render_manifest(variant: Variant, entries: &[TemplateEntry]) -> String {
    manifest(variant, entries, &[])
}

fn manifest(
    variant: Variant,
    entries: &[TemplateEntry],
    extra_replaces: &[(String, String)],
) -> String {
    let spec = spec(variant);
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(out, "module {}", variant.umbrella_module());
    let _ = writeln!(out);
    let _ = writeln!(out, "go {}", spec.go);
    if let Some(toolchain) = spec.toolchain {
        let _ = writeln!(out);
        let _ = writeln!(out, "toolchain {toolchain}");
    }
    let _ = writeln!(out);

    out.push_str("require (\n");
    for line in spec.baseline {
        let _ = writeln!(out, "\t{line}");
    }
    if !entries.is_empty() {
        out.push('\n');
        for entry in entries {
            let _ = writeln!(out, "\t{}", entry.require_line());
        }
    }
    out.push_str(")\n");

    if !spec.excludes.is_empty() {
        out.push_str("\nexclude (\n");
        for line in spec.excludes {
            let _ = writeln!(out, "\t{line}");
        }
        out.push_str(")\n");
    }

    for line in spec.fixed_replaces {
        let _ = writeln!(out, "\nreplace {line}");
    }

    let replaces: Vec<(&str, &str)> = entries
        .iter()
        .filter_map(|e| e.replace.as_deref().map(|target| (e.module.as_str(), target)))
        .chain(extra_replaces.iter().map(|(m, t)| (m.as_str(), t.as_str())))
        .collect();
    if spec.plugin_replaces {
        if !replaces.is_empty() {
            out.push_str("\nreplace (\n");
            for (module, target) in &replaces {
                let _ = writeln!(out, "\t{module} => {target}");
            }
            out.push_str(")\n");
        }
    } else {
        for (module, _) in &replaces {
            tracing::warn!(
                module = %module,
                variant = %variant,
                "replace directives are not generated for this server variant, ignoring"
            );
        }
    }

    out
}

/// `container/plugins.go` registering the bundled plugins, then each entry
/// in order.
pub fn render_registration(variant: Variant, entries: &[TemplateEntry]) -> String {
    let bundled = spec(variant).bundled_major;
    let mut out = String::new();

    out.push_str("package container\n\n");
    out.push_str("import (\n");
    let _ = writeln!(out, "\t\"github.com/roadrunner-server/informer/{bundled}\"");
    let _ = writeln!(out, "\t\"github.com/roadrunner-server/resetter/{bundled}\"");
    for entry in entries {
        let _ = writeln!(out, "\t{}", entry.import_line());
    }
    out.push_str(")\n\n");

    out.push_str("func Plugins() []any {\n");
    out.push_str("\treturn []any{\n");
    out.push_str("\t\t// bundled\n");
    out.push_str("\t\t// informer plugin (./rr workers, ./rr workers -i)\n");
    out.push_str("\t\t&informer.Plugin{},\n");
    out.push_str("\t\t// resetter plugin (./rr reset)\n");
    out.push_str("\t\t&resetter.Plugin{},\n");
    if !entries.is_empty() {
        out.push_str("\n\t\t// std and custom plugins\n");
        for entry in entries {
            let _ = writeln!(out, "\t\t{},", entry.registration());
        }
    }
    out.push_str("\t}\n");
    out.push_str("}\n");

    out
}
