//! Minimal grammars for the dependencies a manifest declares.
//!
//! These never resolve anything. They only find where each declared
//! package sits in the file (line and byte span of its name) so the
//! annotation view can point at it.

use crate::model::Ecosystem;
use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::sync::LazyLock;

/// A package named in a manifest, located by zero-based line and the byte
/// span of its name within that line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclaredDependency {
    pub name: String,
    pub version: String,
    pub line: usize,
    pub span: Range<usize>,
}

impl DeclaredDependency {
    fn new(name: &str, version: &str, line: usize, span: Range<usize>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            line,
            span,
        }
    }
}

/// Parses `text` with the grammar of `ecosystem`'s manifest.
///
/// Lines that don't fit the grammar are skipped.
pub fn declared_dependencies(ecosystem: Ecosystem, text: &str) -> Vec<DeclaredDependency> {
    match ecosystem {
        Ecosystem::Python => parse_requirements(text),
        Ecosystem::Go => parse_go_mod(text),
        Ecosystem::Npm => parse_json_manifest(text, NPM_SECTIONS),
        Ecosystem::Composer => parse_json_manifest(text, COMPOSER_SECTIONS),
        Ecosystem::Cargo => parse_cargo_toml(text),
    }
}

static REQUIREMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").unwrap());

fn parse_requirements(text: &str) -> Vec<DeclaredDependency> {
    let mut deps = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
            continue;
        }

        let Some(name) = REQUIREMENT_NAME.captures(line).and_then(|c| c.get(1)) else {
            continue;
        };

        let rest = line[name.end()..].split('#').next().unwrap_or("");
        let version = match rest.find(|c: char| "=<>~!".contains(c)) {
            Some(op) => rest[op..]
                .trim_start_matches(|c: char| "=<>~!".contains(c) || c.is_whitespace())
                .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .next()
                .unwrap_or(""),
            None => "",
        };

        deps.push(DeclaredDependency::new(
            name.as_str(),
            version,
            index,
            name.range(),
        ));
    }

    deps
}

static GO_REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:require\s+)?([^\s()]+)\s+(v\d[^\s]*)").unwrap()
});

fn parse_go_mod(text: &str) -> Vec<DeclaredDependency> {
    let mut deps = Vec::new();
    let mut in_require = false;

    for (index, line) in text.lines().enumerate() {
        let code = line.split("//").next().unwrap_or("");
        let trimmed = code.trim();

        if in_require {
            if trimmed.starts_with(')') {
                in_require = false;
                continue;
            }
        } else if let Some(rest) = trimmed.strip_prefix("require") {
            if rest.trim_start().starts_with('(') {
                in_require = true;
                continue;
            }
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
        } else {
            continue;
        }

        if let Some(caps) = GO_REQUIREMENT.captures(code) {
            if let (Some(module), Some(version)) = (caps.get(1), caps.get(2)) {
                deps.push(DeclaredDependency::new(
                    module.as_str(),
                    version.as_str(),
                    index,
                    module.range(),
                ));
            }
        }
    }

    deps
}

const NPM_SECTIONS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "optionalDependencies",
    "peerDependencies",
];

const COMPOSER_SECTIONS: &[&str] = &["require", "require-dev"];

static JSON_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"([^"]+)"\s*:\s*\{"#).unwrap());

static JSON_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"([^"]+)"\s*:\s*"[\^~]?([^"]*)""#).unwrap());

/// Scans `text` tracking brace depth. A section is a wanted key of the
/// top-level object whose value is an object; its entries sit one level
/// deeper. Values that are objects themselves are skipped whole.
fn parse_json_manifest(text: &str, sections: &[&str]) -> Vec<DeclaredDependency> {
    let mut deps = Vec::new();
    let mut depth = 0usize;
    let mut in_section = false;

    for (index, line) in text.lines().enumerate() {
        let mut pos = 0;
        while pos < line.len() {
            let rest = &line[pos..];

            if in_section && depth == 2 {
                if let Some(caps) = JSON_ENTRY.captures(rest) {
                    if let (Some(all), Some(name), Some(version)) =
                        (caps.get(0), caps.get(1), caps.get(2))
                    {
                        deps.push(DeclaredDependency::new(
                            name.as_str(),
                            version.as_str(),
                            index,
                            pos + name.start()..pos + name.end(),
                        ));
                        pos += all.end();
                        continue;
                    }
                }
            } else if !in_section && depth == 1 {
                if let Some(caps) = JSON_SECTION.captures(rest) {
                    if let (Some(all), Some(name)) = (caps.get(0), caps.get(1)) {
                        if sections.contains(&name.as_str()) {
                            in_section = true;
                            depth += 1;
                            pos += all.end();
                            continue;
                        }
                    }
                }
            }

            let Some(c) = rest.chars().next() else {
                break;
            };
            match c {
                '"' => {
                    pos += string_len(rest);
                    continue;
                }
                '{' | '[' => depth += 1,
                '}' | ']' => {
                    depth = depth.saturating_sub(1);
                    if depth < 2 {
                        in_section = false;
                    }
                }
                _ => {}
            }
            pos += c.len_utf8();
        }
    }

    deps
}

/// Byte length of the string literal at the start of `rest`, quotes
/// included. An unterminated string runs to the end of the line.
fn string_len(rest: &str) -> usize {
    let mut escaped = false;
    for (i, c) in rest.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return i + 1,
            _ => {}
        }
    }
    rest.len()
}

static TOML_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[([^\[\]]+)\]\s*(?:#.*)?$").unwrap());

static TOML_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z0-9_-]+)\s*=\s*(.*)$").unwrap());

static TOML_INLINE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bversion\s*=\s*"([^"]*)""#).unwrap());

enum CargoTable {
    Other,
    /// `[dependencies]`, `[dev-dependencies]`, `[target.'cfg(..)'.dependencies]`, ...
    Dependencies,
    /// `[dependencies.serde]`: index into the output of the dep it declares.
    Dotted(usize),
}

fn parse_cargo_toml(text: &str) -> Vec<DeclaredDependency> {
    let mut deps: Vec<DeclaredDependency> = Vec::new();
    let mut table = CargoTable::Other;

    for (index, line) in text.lines().enumerate() {
        if let Some(caps) = TOML_TABLE.captures(line) {
            let Some(header) = caps.get(1) else {
                continue;
            };
            let name = header.as_str().trim();

            table = if name.ends_with("dependencies") {
                CargoTable::Dependencies
            } else if let Some((parent, dep)) = name.rsplit_once('.') {
                if parent.ends_with("dependencies") && !dep.is_empty() {
                    let lead = header.as_str().len() - header.as_str().trim_start().len();
                    let offset = header.start() + lead + parent.len() + 1;
                    deps.push(DeclaredDependency::new(dep, "", index, offset..offset + dep.len()));
                    CargoTable::Dotted(deps.len() - 1)
                } else {
                    CargoTable::Other
                }
            } else {
                CargoTable::Other
            };
            continue;
        }

        // Arrays of tables (`[[bin]]`) never hold dependencies.
        if line.trim_start().starts_with('[') {
            table = CargoTable::Other;
            continue;
        }

        let Some(caps) = TOML_KEY.captures(line) else {
            continue;
        };
        let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = value.as_str().trim();

        match table {
            CargoTable::Other => {}
            CargoTable::Dotted(at) => {
                if key.as_str() == "version" {
                    deps[at].version = quoted(value).unwrap_or_default().to_string();
                }
            }
            CargoTable::Dependencies => {
                let version = if value.starts_with('"') {
                    quoted(value)
                } else if value.starts_with('{') {
                    Some(
                        TOML_INLINE_VERSION
                            .captures(value)
                            .and_then(|c| c.get(1))
                            .map_or("", |m| m.as_str()),
                    )
                } else {
                    None
                };

                if let Some(version) = version {
                    deps.push(DeclaredDependency::new(
                        key.as_str(),
                        version,
                        index,
                        key.range(),
                    ));
                }
            }
        }
    }

    deps
}

fn quoted(value: &str) -> Option<&str> {
    let inner = value.strip_prefix('"')?;
    inner.split('"').next()
}
