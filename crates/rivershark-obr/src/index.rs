//! The repository index: an OSGi Repository (R5) XML document describing
//! every artifact in storage.
//!
//! The document is always regenerated from the full storage directory. It
//! carries no timestamps, so rebuilding an unchanged repository produces
//! byte-identical output.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use quick_xml::escape::escape;
use quick_xml::events::attributes::Attribute as XmlAttribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Writer;
use rivershark_config::StoredArtifactPolicy;
use sha2::{Digest, Sha256};
use url::Url;
use walkdir::WalkDir;

use crate::error::{io_error, InvalidArtifact, RepositoryError, Result};
use crate::model::{
    is_xml_char, ArtifactIdentity, ArtifactMetadata, Attribute, AttributeValue, Clause,
    BUNDLE_MIME_TYPE, CONTENT_NAMESPACE, IDENTITY_NAMESPACE,
};
use crate::reader::ArtifactReader;
use crate::version::BundleVersion;

pub const REPOSITORY_XML_NAMESPACE: &str = "http://www.osgi.org/xmlns/repository/v1.0.0";
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// File suffix of stored artifacts. In-progress copies end in `.jar.tmp` and
/// never match.
pub const ARTIFACT_SUFFIX: &str = ".jar";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub name: String,
    /// The repository directory; resource URLs are relative to it.
    pub base: Url,
    pub resources: Vec<IndexedResource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedResource {
    pub capabilities: Vec<Clause>,
    pub requirements: Vec<Clause>,
}

impl IndexedResource {
    fn from_artifact(metadata: ArtifactMetadata, content: Clause) -> Self {
        let mut capabilities = metadata.capabilities;
        let position = capabilities
            .iter()
            .position(|c| c.namespace == IDENTITY_NAMESPACE)
            .map_or(0, |idx| idx + 1);
        capabilities.insert(position, content);
        Self {
            capabilities,
            requirements: metadata.requirements,
        }
    }

    fn capability(&self, namespace: &str) -> Option<&Clause> {
        self.capabilities.iter().find(|c| c.namespace == namespace)
    }

    fn content_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.capability(CONTENT_NAMESPACE)?.find_attribute(name)
    }

    pub fn identity(&self) -> Option<ArtifactIdentity> {
        let capability = self.capability(IDENTITY_NAMESPACE)?;
        let name = match capability.find_attribute(IDENTITY_NAMESPACE)? {
            AttributeValue::String(name) => name.clone(),
            _ => return None,
        };
        let version = match capability.find_attribute("version") {
            Some(AttributeValue::Version(version)) => version.clone(),
            _ => BundleVersion::ZERO,
        };
        Some(ArtifactIdentity::new(name, version))
    }

    /// Location relative to the repository base.
    pub fn url(&self) -> Option<&str> {
        match self.content_attribute("url")? {
            AttributeValue::String(url) => Some(url),
            _ => None,
        }
    }

    /// Lowercase hex SHA-256 of the artifact file.
    pub fn sha256(&self) -> Option<&str> {
        match self.content_attribute(CONTENT_NAMESPACE)? {
            AttributeValue::String(digest) => Some(digest),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self.content_attribute("size")? {
            AttributeValue::Long(size) => Some(*size),
            _ => None,
        }
    }
}

impl IndexDocument {
    /// Render the document as R5 repository XML.
    pub fn to_xml(&self) -> io::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut repository = BytesStart::new("repository");
        push_attribute(&mut repository, "xmlns", REPOSITORY_XML_NAMESPACE);
        push_attribute(&mut repository, "name", &self.name);
        push_attribute(&mut repository, "xml:base", self.base.as_str());
        emit(&mut writer, Event::Start(repository))?;

        for resource in &self.resources {
            emit(&mut writer, Event::Start(BytesStart::new("resource")))?;
            for capability in &resource.capabilities {
                write_clause(&mut writer, "capability", capability)?;
            }
            for requirement in &resource.requirements {
                write_clause(&mut writer, "requirement", requirement)?;
            }
            emit(&mut writer, Event::End(BytesEnd::new("resource")))?;
        }
        emit(&mut writer, Event::End(BytesEnd::new("repository")))?;

        let mut xml = String::from_utf8(writer.into_inner()).map_err(io::Error::other)?;
        xml.push('\n');
        Ok(xml)
    }

    /// Parse R5 repository XML.
    pub fn parse(text: &str) -> std::result::Result<Self, IndexReadError> {
        let doc = roxmltree::Document::parse(text)?;
        let root = doc.root_element();
        if root.tag_name().name() != "repository"
            || root.tag_name().namespace() != Some(REPOSITORY_XML_NAMESPACE)
        {
            return Err(IndexReadError::malformed("root element is not an R5 repository"));
        }

        let name = root
            .attribute("name")
            .ok_or_else(|| IndexReadError::malformed("repository has no name"))?
            .to_owned();
        let base = root
            .attribute((XML_NAMESPACE, "base"))
            .ok_or_else(|| IndexReadError::malformed("repository has no xml:base"))?;
        let base = Url::parse(base)
            .map_err(|err| IndexReadError::malformed(format!("invalid xml:base: {err}")))?;

        let mut resources = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("resource")) {
            let mut resource = IndexedResource {
                capabilities: Vec::new(),
                requirements: Vec::new(),
            };
            for child in node.children().filter(|n| n.is_element()) {
                let clause = parse_clause(&child)?;
                match child.tag_name().name() {
                    "capability" => resource.capabilities.push(clause),
                    "requirement" => resource.requirements.push(clause),
                    _ => {}
                }
            }
            resources.push(resource);
        }

        Ok(Self {
            name,
            base,
            resources,
        })
    }
}

fn write_clause(writer: &mut Writer<Vec<u8>>, element: &str, clause: &Clause) -> io::Result<()> {
    let mut start = BytesStart::new(element);
    push_attribute(&mut start, "namespace", &clause.namespace);
    emit(writer, Event::Start(start))?;

    for attribute in &clause.attributes {
        let mut empty = BytesStart::new("attribute");
        push_attribute(&mut empty, "name", &attribute.name);
        if let Some(ty) = attribute.value.xml_type() {
            push_attribute(&mut empty, "type", ty);
        }
        push_attribute(&mut empty, "value", &attribute.value.to_string());
        emit(writer, Event::Empty(empty))?;
    }
    for (name, value) in &clause.directives {
        let mut empty = BytesStart::new("directive");
        push_attribute(&mut empty, "name", name);
        push_attribute(&mut empty, "value", value);
        emit(writer, Event::Empty(empty))?;
    }

    emit(writer, Event::End(BytesEnd::new(element)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> io::Result<()> {
    writer.write_event(event).map_err(io::Error::other)
}

/// Escapes markup and the whitespace that attribute value normalization
/// would turn into spaces. Characters XML cannot carry at all become U+FFFD.
fn push_attribute(start: &mut BytesStart<'_>, name: &str, value: &str) {
    let mut escaped = String::with_capacity(value.len());
    for ch in escape(value).chars() {
        match ch {
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            ch if !is_xml_char(ch) => escaped.push(char::REPLACEMENT_CHARACTER),
            ch => escaped.push(ch),
        }
    }
    start.push_attribute(XmlAttribute {
        key: QName(name.as_bytes()),
        value: Cow::Owned(escaped.into_bytes()),
    });
}

fn parse_clause(node: &roxmltree::Node<'_, '_>) -> std::result::Result<Clause, IndexReadError> {
    let namespace = node
        .attribute("namespace")
        .ok_or_else(|| IndexReadError::malformed("clause has no namespace"))?;
    let mut clause = Clause::new(namespace);

    for child in node.children().filter(|n| n.is_element()) {
        let (Some(name), Some(value)) = (child.attribute("name"), child.attribute("value")) else {
            return Err(IndexReadError::malformed(format!(
                "{} in {namespace} needs name and value",
                child.tag_name().name()
            )));
        };

        match child.tag_name().name() {
            "attribute" => {
                let value = match child.attribute("type") {
                    Some("Version") => AttributeValue::Version(
                        BundleVersion::parse(value).map_err(|err| {
                            IndexReadError::malformed(format!("attribute {name}: {err}"))
                        })?,
                    ),
                    Some("Long") => AttributeValue::Long(value.parse().map_err(|err| {
                        IndexReadError::malformed(format!("attribute {name}: {err}"))
                    })?),
                    _ => AttributeValue::String(value.to_owned()),
                };
                clause.attributes.push(Attribute {
                    name: name.to_owned(),
                    value,
                });
            }
            "directive" => clause.directives.push((name.to_owned(), value.to_owned())),
            _ => {}
        }
    }
    Ok(clause)
}

#[derive(Debug, thiserror::Error)]
pub enum IndexReadError {
    #[error("failed to read index {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("index is not well-formed xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("malformed index: {message}")]
    Malformed { message: String },
}

impl IndexReadError {
    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Read and parse an index file.
pub fn read_index(path: impl AsRef<Path>) -> std::result::Result<IndexDocument, IndexReadError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| IndexReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    IndexDocument::parse(&text)
}

/// Inputs for [`build_index`].
pub(crate) struct IndexSource<'a> {
    pub name: &'a str,
    pub base: &'a Url,
    pub storage_dir: &'a Path,
    pub readers: &'a dyn ArtifactReader,
    pub policy: StoredArtifactPolicy,
}

/// Scan the storage directory and describe every artifact in it.
pub(crate) fn build_index(source: &IndexSource<'_>) -> Result<IndexDocument> {
    let storage_dir = source.storage_dir;
    let storage_url = storage_url(source.base, storage_dir)?;
    let mut resources = Vec::new();
    let mut excluded = 0usize;

    let entries = WalkDir::new(storage_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in entries {
        let entry = entry.map_err(|err| io_error("list", storage_dir)(err.into()))?;
        let path = entry.path();
        let Some(file_name) = entry.file_name().to_str() else {
            tracing::warn!(
                target: "rivershark.obr",
                path = %path.display(),
                "skipping non UTF-8 file name in storage"
            );
            continue;
        };
        if !file_name.ends_with(ARTIFACT_SUFFIX) {
            continue;
        }
        // Symlinks count when their target is a regular file.
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink()
                && std::fs::metadata(path).is_ok_and(|target| target.is_file()));
        if !is_file {
            tracing::warn!(
                target: "rivershark.obr",
                path = %path.display(),
                "skipping non-regular file in storage"
            );
            continue;
        }

        let metadata = match source.readers.read(path) {
            Ok(metadata) => metadata,
            Err(reason) => {
                let invalid = InvalidArtifact::new(path, reason);
                match source.policy {
                    StoredArtifactPolicy::Reject => {
                        return Err(RepositoryError::StoredArtifactInvalid(invalid));
                    }
                    StoredArtifactPolicy::Exclude => {
                        tracing::warn!(
                            target: "rivershark.obr",
                            path = %path.display(),
                            reason = %invalid.reason,
                            "excluding invalid stored artifact from index"
                        );
                        excluded += 1;
                        continue;
                    }
                }
            }
        };

        let canonical = metadata.identity.canonical_file_name();
        if canonical != file_name {
            tracing::debug!(
                target: "rivershark.obr",
                path = %path.display(),
                canonical,
                "stored artifact is not under its canonical name"
            );
        }

        let (sha256, size) = content_digest(path).map_err(io_error("hash", path))?;
        let mut url = storage_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(file_name);
        }
        let relative = source.base.make_relative(&url).unwrap_or_else(|| url.to_string());

        let content = Clause::new(CONTENT_NAMESPACE)
            .attribute(Attribute::string(CONTENT_NAMESPACE, sha256))
            .attribute(Attribute::string("url", relative))
            .attribute(Attribute::long("size", size))
            .attribute(Attribute::string("mime", BUNDLE_MIME_TYPE));
        let identity = metadata.identity.clone();
        resources.push((identity, IndexedResource::from_artifact(metadata, content)));
    }

    // Directory order already breaks ties between copies of one identity.
    resources.sort_by(|(a, _), (b, _)| a.cmp(b));

    tracing::debug!(
        target: "rivershark.obr",
        storage = %storage_dir.display(),
        resources = resources.len(),
        excluded,
        "scanned storage"
    );

    Ok(IndexDocument {
        name: source.name.to_owned(),
        base: source.base.clone(),
        resources: resources.into_iter().map(|(_, resource)| resource).collect(),
    })
}

fn storage_url(base: &Url, storage_dir: &Path) -> Result<Url> {
    Url::from_directory_path(storage_dir).map_err(|()| {
        io_error("resolve", storage_dir)(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("storage directory is not expressible relative to {base}"),
        ))
    })
}

/// SHA-256 (lowercase hex) and length of a file, streamed.
fn content_digest(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        size += read as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}

/// Write `document` to `path` via `tmp_path`.
pub(crate) fn write_index(path: &Path, tmp_path: &Path, document: &IndexDocument) -> Result<()> {
    let xml = document.to_xml().map_err(io_error("render index", path))?;
    crate::util::atomic_write_with(path, tmp_path, |file| file.write_all(xml.as_bytes()))
        .map_err(io_error("write index", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactKind;

    fn sample_document() -> IndexDocument {
        let metadata = ArtifactMetadata {
            identity: ArtifactIdentity::new("com.example.widget", BundleVersion::new(1, 2, 0)),
            kind: ArtifactKind::Bundle,
            capabilities: vec![Clause::new(IDENTITY_NAMESPACE)
                .attribute(Attribute::string(IDENTITY_NAMESPACE, "com.example.widget"))
                .attribute(Attribute::string("type", "osgi.bundle"))
                .attribute(Attribute::version("version", BundleVersion::new(1, 2, 0)))],
            requirements: vec![Clause::new("osgi.wiring.package")
                .directive("filter", "(&(osgi.wiring.package=a)(version>=1.0.0))")],
        };
        let content = Clause::new(CONTENT_NAMESPACE)
            .attribute(Attribute::string(CONTENT_NAMESPACE, "00ff"))
            .attribute(Attribute::string("url", "bundles/com.example.widget-1.2.0.jar"))
            .attribute(Attribute::long("size", 42))
            .attribute(Attribute::string("mime", BUNDLE_MIME_TYPE));

        IndexDocument {
            name: "Rivershark & Friends".to_owned(),
            base: Url::parse("file:///srv/obr/").unwrap(),
            resources: vec![IndexedResource::from_artifact(metadata, content)],
        }
    }

    #[test]
    fn xml_parses_back_to_the_same_document() {
        let document = sample_document();
        let xml = document.to_xml().unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<repository"), "{xml}");
        assert!(xml.ends_with("</repository>\n"), "{xml}");
        assert!(xml.contains(r#"name="Rivershark &amp; Friends""#), "{xml}");
        assert!(xml.contains(r#"xml:base="file:///srv/obr/""#), "{xml}");
        assert_eq!(IndexDocument::parse(&xml).unwrap(), document);
    }

    #[test]
    fn xml_keeps_whitespace_and_replaces_forbidden_characters() {
        let mut document = sample_document();
        document.name = "bell\u{7} tab\t".to_owned();
        document.resources[0].requirements[0] =
            Clause::new("osgi.wiring.package").directive("note", "line\nbreak");
        let xml = document.to_xml().unwrap();

        assert!(xml.contains("&#10;"), "{xml}");
        let parsed = IndexDocument::parse(&xml).unwrap();
        assert_eq!(parsed.name, "bell\u{FFFD} tab\t");
        assert_eq!(
            parsed.resources[0].requirements[0].find_directive("note"),
            Some("line\nbreak")
        );
    }

    #[test]
    fn resource_accessors_read_identity_and_content() {
        let document = sample_document();
        let resource = &document.resources[0];

        assert_eq!(
            resource.identity(),
            Some(ArtifactIdentity::new("com.example.widget", BundleVersion::new(1, 2, 0)))
        );
        assert_eq!(resource.url(), Some("bundles/com.example.widget-1.2.0.jar"));
        assert_eq!(resource.sha256(), Some("00ff"));
        assert_eq!(resource.size(), Some(42));
        // Content follows identity.
        assert_eq!(resource.capabilities[1].namespace, CONTENT_NAMESPACE);
    }

    #[test]
    fn rejects_foreign_documents() {
        let err = IndexDocument::parse("<repository name=\"x\"/>").unwrap_err();
        assert!(matches!(err, IndexReadError::Malformed { .. }), "{err}");

        let err = IndexDocument::parse("<repository").unwrap_err();
        assert!(matches!(err, IndexReadError::Xml(_)), "{err}");
    }

    #[test]
    fn content_digest_matches_known_value() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();

        let (sha256, size) = content_digest(&path).unwrap();
        assert_eq!(
            sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(size, 3);
    }
}
