//! `META-INF/MANIFEST.MF` parsing and OSGi header clause syntax.

use std::collections::BTreeMap;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

pub const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const BUNDLE_VERSION: &str = "Bundle-Version";
pub const EXPORT_PACKAGE: &str = "Export-Package";
pub const IMPORT_PACKAGE: &str = "Import-Package";
pub const REQUIRE_BUNDLE: &str = "Require-Bundle";
pub const FRAGMENT_HOST: &str = "Fragment-Host";

/// The main attributes section of a jar manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    headers: Vec<(String, String)>,
}

impl Manifest {
    /// Parse the main section. Invalid UTF-8 is replaced rather than rejected;
    /// lines without a `:` are skipped.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut headers = Vec::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');

            // The first empty line terminates the main attributes section.
            if line.is_empty() {
                break;
            }

            if let Some(rest) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(rest);
                }
                continue;
            }

            if let Some(header) = current.take() {
                headers.push(header);
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            current = Some((key.trim().to_owned(), value.trim_start().to_owned()));
        }
        if let Some(header) = current {
            headers.push(header);
        }

        Self { headers }
    }

    /// Look up a main attribute. Header names are case-insensitive; values are trimmed.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Look up a header and split it into clauses.
    pub fn clauses(&self, name: &str) -> Vec<HeaderClause> {
        self.get(name).map(parse_clauses).unwrap_or_default()
    }
}

/// One comma-separated clause of an OSGi header, e.g.
/// `com.example.api;com.example.spi;version="1.2";uses:="org.slf4j"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderClause {
    pub paths: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub directives: BTreeMap<String, String>,
}

impl HeaderClause {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }
}

/// Split an OSGi header value into clauses.
///
/// Separators inside double quotes are literal. Typed attributes
/// (`version:Version="1.0"`) are stored under their bare name.
pub fn parse_clauses(header: &str) -> Vec<HeaderClause> {
    split_unquoted(header, ',')
        .into_iter()
        .filter_map(|raw| {
            let mut clause = HeaderClause::default();
            for part in split_unquoted(raw, ';') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }

                if let Some((key, value)) = part.split_once(":=") {
                    clause
                        .directives
                        .insert(key.trim().to_owned(), unquote(value));
                } else if let Some((key, value)) = part.split_once('=') {
                    let key = key.split_once(':').map_or(key, |(name, _ty)| name);
                    clause
                        .attributes
                        .insert(key.trim().to_owned(), unquote(value));
                } else {
                    clause.paths.push(part.to_owned());
                }
            }
            (!clause.paths.is_empty()).then_some(clause)
        })
        .collect()
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                out.push(&text[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&text[start..]);
    out
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_owned()
}
