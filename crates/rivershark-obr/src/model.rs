use crate::error::InvalidArtifactReason;
use crate::version::BundleVersion;
use std::fmt;

pub const IDENTITY_NAMESPACE: &str = "osgi.identity";
pub const CONTENT_NAMESPACE: &str = "osgi.content";
pub const BUNDLE_NAMESPACE: &str = "osgi.wiring.bundle";
pub const HOST_NAMESPACE: &str = "osgi.wiring.host";
pub const PACKAGE_NAMESPACE: &str = "osgi.wiring.package";

/// MIME type recorded in `osgi.content` capabilities.
pub const BUNDLE_MIME_TYPE: &str = "application/vnd.osgi.bundle";

/// The (symbolic name, version) pair naming an artifact within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactIdentity {
    pub symbolic_name: String,
    pub version: BundleVersion,
}

impl ArtifactIdentity {
    pub fn new(symbolic_name: impl Into<String>, version: BundleVersion) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version,
        }
    }

    /// The name this artifact is stored under: `{symbolic-name}-{version}.jar`.
    pub fn canonical_file_name(&self) -> String {
        format!("{}-{}.jar", self.symbolic_name, self.version)
    }
}

impl fmt::Display for ArtifactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbolic_name, self.version)
    }
}

/// Symbolic names are dotted tokens; anything else could escape the storage
/// directory once turned into a file name.
pub(crate) fn is_valid_symbolic_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|token| {
            !token.is_empty()
                && token
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Bundle,
    Fragment,
}

impl ArtifactKind {
    pub fn identity_type(self) -> &'static str {
        match self {
            ArtifactKind::Bundle => "osgi.bundle",
            ArtifactKind::Fragment => "osgi.fragment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    Version(BundleVersion),
    Long(u64),
}

impl AttributeValue {
    /// The `type` attribute of an R5 repository `<attribute>` element, if any.
    pub fn xml_type(&self) -> Option<&'static str> {
        match self {
            AttributeValue::String(_) => None,
            AttributeValue::Version(_) => Some("Version"),
            AttributeValue::Long(_) => Some("Long"),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(value) => f.write_str(value),
            AttributeValue::Version(value) => value.fmt(f),
            AttributeValue::Long(value) => value.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn string(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_owned(),
            value: AttributeValue::String(value.into()),
        }
    }

    pub fn version(name: &str, value: BundleVersion) -> Self {
        Self {
            name: name.to_owned(),
            value: AttributeValue::Version(value),
        }
    }

    pub fn long(name: &str, value: u64) -> Self {
        Self {
            name: name.to_owned(),
            value: AttributeValue::Long(value),
        }
    }
}

/// A capability or requirement in a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub namespace: String,
    pub attributes: Vec<Attribute>,
    pub directives: Vec<(String, String)>,
}

impl Clause {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            attributes: Vec::new(),
            directives: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn directive(mut self, name: &str, value: impl Into<String>) -> Self {
        self.directives.push((name.to_owned(), value.into()));
        self
    }

    pub fn find_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| &attribute.value)
    }

    pub fn find_directive(&self, name: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Everything a reader derives from one artifact file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub identity: ArtifactIdentity,
    pub kind: ArtifactKind,
    pub capabilities: Vec<Clause>,
    pub requirements: Vec<Clause>,
}

impl ArtifactMetadata {
    /// Rejects metadata that could not be stored or indexed: the symbolic name
    /// must be a safe file name component and every string must be XML 1.0 text.
    pub fn check(&self) -> Result<(), InvalidArtifactReason> {
        let name = &self.identity.symbolic_name;
        if !is_valid_symbolic_name(name) {
            return Err(InvalidArtifactReason::InvalidSymbolicName { name: name.clone() });
        }

        for clause in self.capabilities.iter().chain(&self.requirements) {
            let attributes = clause.attributes.iter().map(|attribute| {
                let value = match &attribute.value {
                    AttributeValue::String(value) => value.as_str(),
                    // Versions and numbers print as ASCII.
                    AttributeValue::Version(_) | AttributeValue::Long(_) => "",
                };
                (attribute.name.as_str(), value)
            });
            let directives = clause
                .directives
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str()));

            for (name, value) in attributes.chain(directives) {
                if !is_xml_safe(&clause.namespace) || !is_xml_safe(name) || !is_xml_safe(value) {
                    return Err(InvalidArtifactReason::NotXmlSafe {
                        name: format!("{}/{}", clause.namespace, name),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Whether `ch` may appear in an XML 1.0 document.
pub(crate) fn is_xml_char(ch: char) -> bool {
    matches!(
        ch,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn is_xml_safe(text: &str) -> bool {
    text.chars().all(is_xml_char)
}
