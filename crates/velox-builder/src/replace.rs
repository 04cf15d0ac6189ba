//! Lifting `replace` directives out of a locally replaced plugin.
//!
//! Only used when transitive replace is switched on.

use camino::Utf8Path;

/// `module => target` pairs declared in a `go.mod`, both the single-line
/// and the block form. Relative targets are joined onto `base`.
pub fn replace_directives(manifest: &str, base: &Utf8Path) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut in_block = false;

    for raw in manifest.lines() {
        let line = raw.split("//").next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let body = if in_block {
            if line == ")" {
                in_block = false;
                continue;
            }
            line
        } else if let Some(rest) = directive_body(line, "replace") {
            if rest == "(" {
                in_block = true;
                continue;
            }
            rest
        } else {
            continue;
        };

        let Some((module, target)) = body.split_once("=>") else {
            continue;
        };
        let module = module.trim();
        let target = target.trim();
        if module.is_empty() || target.is_empty() {
            continue;
        }

        let target = if target.starts_with('.') {
            base.join(target).to_string()
        } else {
            target.to_string()
        };
        out.push((module.to_string(), target));
    }

    out
}

/// The rest of `line` if it opens with the `keyword` directive
fn directive_body<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
        Some(rest.trim())
    } else {
        None
    }
}

/// Module path of a directive's left side, without any version
pub fn module_path(from: &str) -> &str {
    from.split_whitespace().next().unwrap_or(from)
}

/// Whether a replace target names a local directory rather than a module
pub fn is_local_path(target: &str) -> bool {
    target.starts_with('.') || target.starts_with('/') || Utf8Path::new(target).is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_and_block_forms() {
        let manifest = "module github.com/x/logger\n\
            \n\
            replace github.com/x/a => ../a\n\
            replace (\n\
            \tgithub.com/x/b v1.0.0 => github.com/y/b v1.0.1 // pinned\n\
            \tgithub.com/x/c => /abs/c\n\
            )\n\
            require github.com/x/d v1.0.0\n";

        let got = replace_directives(manifest, Utf8Path::new("/src/logger"));
        assert_eq!(
            got,
            vec![
                ("github.com/x/a".to_string(), "/src/logger/../a".to_string()),
                (
                    "github.com/x/b v1.0.0".to_string(),
                    "github.com/y/b v1.0.1".to_string()
                ),
                ("github.com/x/c".to_string(), "/abs/c".to_string()),
            ]
        );
    }

    #[test]
    fn replace_needs_a_word_boundary() {
        let manifest = "module github.com/x/logger\n\
            replacement github.com/x/a => ../a\n\
            replaced(\n\
            \tgithub.com/x/b => ../b\n\
            )\n\
            replace(\n\
            \tgithub.com/x/c => ../c\n\
            )\n\
            replace\tgithub.com/x/d => /abs/d\n";

        let got = replace_directives(manifest, Utf8Path::new("/src/logger"));
        assert_eq!(
            got,
            vec![
                ("github.com/x/c".to_string(), "/src/logger/../c".to_string()),
                ("github.com/x/d".to_string(), "/abs/d".to_string()),
            ]
        );
    }

    #[test]
    fn module_path_drops_the_version() {
        assert_eq!(module_path("github.com/x/b v1.0.0"), "github.com/x/b");
        assert_eq!(module_path("github.com/x/b"), "github.com/x/b");
    }

    #[test]
    fn local_paths() {
        assert!(is_local_path("./logger"));
        assert!(is_local_path("/src/logger"));
        assert!(!is_local_path("github.com/x/logger v1.0.0"));
    }
}
