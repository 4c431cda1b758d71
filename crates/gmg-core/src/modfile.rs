//! go.mod subset reader.
//!
//! Parses the directives that affect the requirement graph: the `module`
//! path, the optional `go` language version, and `require` entries with
//! their `// indirect` markers. Every other directive (`replace`, `exclude`,
//! `retract`, `toolchain`, `tool`, ...) is ignored, which makes the parser
//! lax in the same way the host toolchain's lax mode is.

use crate::error::{Error, Result};
use crate::module::ModuleId;

/// A single `require` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    /// Required module path and minimum acceptable version.
    pub id: ModuleId,
    /// Whether the entry carries an `// indirect` marker.
    pub indirect: bool,
}

/// The parsed subset of a go.mod file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModFile {
    /// Module path from the `module` directive.
    pub module: String,
    /// Language version from the `go` directive, if present.
    pub go_version: Option<String>,
    /// `require` entries in file order.
    pub require: Vec<Require>,
}

impl ModFile {
    /// Parse go.mod contents. `name` is used in error messages only.
    pub fn parse(name: &str, data: &str) -> Result<Self> {
        let mut file = ModFile::default();
        // Name of the directive whose parenthesized block we are inside, if any.
        let mut block: Option<String> = None;
        for (lineno, raw) in data.lines().enumerate() {
            let lineno = lineno + 1;
            let (code, comment) = split_comment(raw);
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            if let Some(directive) = &block {
                if code == ")" {
                    block = None;
                } else if directive == "require" {
                    file.require.push(parse_require(name, lineno, code, comment)?);
                }
                continue;
            }
            let mut tokens = code.split_whitespace();
            let directive = tokens.next().unwrap_or_default();
            let rest: Vec<&str> = tokens.collect();
            match directive {
                "module" => match rest.as_slice() {
                    [path] => file.module = unquote(path).to_string(),
                    _ => {
                        return Err(Error::parse(format!(
                            "{name}:{lineno}: malformed module directive"
                        )))
                    }
                },
                "go" => match rest.as_slice() {
                    [ver] => file.go_version = Some((*ver).to_string()),
                    _ => return Err(Error::parse(format!("{name}:{lineno}: malformed go directive"))),
                },
                "require" => match rest.as_slice() {
                    ["("] => block = Some("require".to_string()),
                    _ => file
                        .require
                        .push(parse_require(name, lineno, &rest.join(" "), comment)?),
                },
                _ if rest.last() == Some(&"(") => block = Some(directive.to_string()),
                _ => {} // Unrelated directive; ignored.
            }
        }
        if file.module.is_empty() {
            return Err(Error::parse(format!("{name}: missing module directive")));
        }
        Ok(file)
    }

    /// Render a go.mod containing only the `module`, `go`, and `require`
    /// statements. Used to produce a clone of a module's manifest that can
    /// never trigger root-only directives.
    pub fn filtered(&self) -> String {
        let mut out = format!("module {}\n", self.module);
        if let Some(go) = &self.go_version {
            out.push_str(&format!("\ngo {go}\n"));
        }
        if !self.require.is_empty() {
            out.push_str("\nrequire (\n");
            for req in &self.require {
                out.push_str(&format!("\t{} {}", req.id.path, req.id.version));
                if req.indirect {
                    out.push_str(" // indirect");
                }
                out.push('\n');
            }
            out.push_str(")\n");
        }
        out
    }
}

/// Split a line into its code part and the comment following `//`, if any.
fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.split_once("//") {
        Some((code, comment)) => (code, Some(comment)),
        None => (line, None),
    }
}

fn parse_require(name: &str, lineno: usize, code: &str, comment: Option<&str>) -> Result<Require> {
    let tokens: Vec<&str> = code.split_whitespace().collect();
    let (path, version) = match tokens.as_slice() {
        [path, version] => (unquote(path), *version),
        _ => {
            return Err(Error::parse(format!(
                "{name}:{lineno}: malformed require entry {code:?}"
            )))
        }
    };
    let indirect = comment.is_some_and(|c| c.trim() == "indirect");
    Ok(Require {
        id: ModuleId::new(path, version),
        indirect,
    })
}

fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}
