//! Utilities shared by Rivershark tests.
//!
//! Most tests need a handful of small bundle jars on disk. [`BundleJar`]
//! synthesises them from a symbolic name, a version and optional extra
//! headers, so fixtures stay readable next to the assertions that use them.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Builder for an OSGi bundle jar.
#[derive(Debug, Clone)]
pub struct BundleJar {
    headers: Vec<(String, String)>,
    entries: Vec<(String, Vec<u8>)>,
}

impl BundleJar {
    pub fn new(symbolic_name: &str, version: &str) -> Self {
        Self::without_identity()
            .header("Bundle-SymbolicName", symbolic_name)
            .header("Bundle-Version", version)
    }

    /// A jar whose manifest carries only `Manifest-Version`.
    pub fn without_identity() -> Self {
        Self {
            headers: vec![("Manifest-Version".to_string(), "1.0".to_string())],
            entries: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn entry(mut self, name: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.to_string(), contents.into()));
        self
    }

    /// Manifest text with CRLF line endings and headers wrapped at 72 bytes.
    pub fn manifest(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            push_wrapped(&mut out, &format!("{name}: {value}"));
        }
        out.push_str("\r\n");
        out
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let manifest = self.manifest();
        let mut entries = vec![(MANIFEST_PATH, manifest.as_bytes())];
        entries.extend(self.entries.iter().map(|(n, c)| (n.as_str(), c.as_slice())));
        zip_bytes(&entries)
    }

    /// Write the jar to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create jar parent directory");
        }
        std::fs::write(path, self.to_bytes()).expect("write bundle jar");
        path.to_path_buf()
    }
}

/// A plain jar holding `entries` and no manifest at all.
pub fn write_plain_jar(path: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
    std::fs::write(path, zip_bytes(entries)).expect("write plain jar");
    path.to_path_buf()
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, contents) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(contents).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

// Manifest lines are limited to 72 bytes; continuation lines start with a space.
fn push_wrapped(out: &mut String, line: &str) {
    let bytes = line.as_bytes();
    let mut start = 0;
    let mut limit = 72;
    while bytes.len() - start > limit {
        let mut end = start + limit;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        if start > 0 {
            out.push(' ');
        }
        out.push_str(&line[start..end]);
        out.push_str("\r\n");
        start = end;
        limit = 71;
    }
    if start > 0 {
        out.push(' ');
    }
    out.push_str(&line[start..]);
    out.push_str("\r\n");
}

/// Read every `.jar` file name in `dir`, sorted.
pub fn jar_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read storage dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".jar"))
        .collect();
    names.sort();
    names
}
