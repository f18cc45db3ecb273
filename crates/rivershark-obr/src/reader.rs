//! Artifact readers: derive identity and capabilities from an artifact file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use rivershark_archive::{has_zip_magic, Archive};

use crate::error::{InvalidArtifact, InvalidArtifactReason};
use crate::manifest::{
    HeaderClause, Manifest, BUNDLE_SYMBOLIC_NAME, BUNDLE_VERSION, EXPORT_PACKAGE, FRAGMENT_HOST,
    IMPORT_PACKAGE, MANIFEST_PATH, REQUIRE_BUNDLE,
};
use crate::model::{
    is_valid_symbolic_name, ArtifactIdentity, ArtifactKind, ArtifactMetadata, Attribute, Clause,
    BUNDLE_NAMESPACE, HOST_NAMESPACE, IDENTITY_NAMESPACE, PACKAGE_NAMESPACE,
};
use crate::version::{BundleVersion, VersionRange};

/// Number of leading bytes handed to [`ArtifactReader::accepts`].
const HEADER_LEN: usize = 8;

/// A reader for one artifact packaging format.
///
/// Readers are pure: they only read the file they are given.
pub trait ArtifactReader: Send + Sync {
    /// Short name of the format, used in logs.
    fn format(&self) -> &'static str;

    /// Whether this reader understands a file starting with `header`.
    fn accepts(&self, path: &Path, header: &[u8]) -> bool;

    fn read(&self, path: &Path) -> Result<ArtifactMetadata, InvalidArtifactReason>;

    fn identify(&self, path: &Path) -> Result<ArtifactIdentity, InvalidArtifact> {
        self.read(path)
            .map(|metadata| metadata.identity)
            .map_err(|reason| InvalidArtifact::new(path, reason))
    }
}

/// OSGi bundles: jars whose manifest carries `Bundle-SymbolicName` and `Bundle-Version`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundleManifestReader;

impl ArtifactReader for BundleManifestReader {
    fn format(&self) -> &'static str {
        "osgi-bundle"
    }

    fn accepts(&self, _path: &Path, header: &[u8]) -> bool {
        has_zip_magic(header)
    }

    fn read(&self, path: &Path) -> Result<ArtifactMetadata, InvalidArtifactReason> {
        let bytes = Archive::new(path)
            .read(MANIFEST_PATH)
            .map_err(|err| InvalidArtifactReason::Unreadable {
                message: format!("{err:#}"),
            })?
            .ok_or(InvalidArtifactReason::MissingIdentity)?;

        metadata_from_manifest(&Manifest::parse(&bytes))
    }
}

pub(crate) fn metadata_from_manifest(
    manifest: &Manifest,
) -> Result<ArtifactMetadata, InvalidArtifactReason> {
    let name_clause = manifest
        .clauses(BUNDLE_SYMBOLIC_NAME)
        .into_iter()
        .next()
        .ok_or(InvalidArtifactReason::MissingIdentity)?;
    let version_text = manifest
        .get(BUNDLE_VERSION)
        .ok_or(InvalidArtifactReason::MissingIdentity)?;

    let name = name_clause.paths[0].clone();
    if !is_valid_symbolic_name(&name) {
        return Err(InvalidArtifactReason::InvalidSymbolicName { name });
    }
    let version = BundleVersion::parse(version_text).map_err(|source| {
        InvalidArtifactReason::UnparseableVersion {
            value: version_text.to_owned(),
            source,
        }
    })?;

    let host = manifest.clauses(FRAGMENT_HOST).into_iter().next();
    let kind = if host.is_some() {
        ArtifactKind::Fragment
    } else {
        ArtifactKind::Bundle
    };

    let mut identity_capability = Clause::new(IDENTITY_NAMESPACE)
        .attribute(Attribute::string(IDENTITY_NAMESPACE, name.clone()))
        .attribute(Attribute::string("type", kind.identity_type()))
        .attribute(Attribute::version("version", version.clone()));
    if let Some(singleton) = name_clause.directive("singleton") {
        identity_capability = identity_capability.directive("singleton", singleton);
    }

    let mut capabilities = vec![identity_capability];
    let mut requirements = Vec::new();

    match &host {
        Some(host) => requirements.push(requirement(
            HOST_NAMESPACE,
            &host.paths[0],
            "bundle-version",
            host,
        )),
        None => {
            capabilities.push(
                Clause::new(BUNDLE_NAMESPACE)
                    .attribute(Attribute::string(BUNDLE_NAMESPACE, name.clone()))
                    .attribute(Attribute::version("bundle-version", version.clone())),
            );
            capabilities.push(
                Clause::new(HOST_NAMESPACE)
                    .attribute(Attribute::string(HOST_NAMESPACE, name.clone()))
                    .attribute(Attribute::version("bundle-version", version.clone())),
            );
        }
    }

    for clause in manifest.clauses(EXPORT_PACKAGE) {
        let package_version = clause
            .attribute("version")
            .and_then(|text| lenient_version(&name, EXPORT_PACKAGE, text))
            .unwrap_or(BundleVersion::ZERO);
        for package in &clause.paths {
            let mut capability = Clause::new(PACKAGE_NAMESPACE)
                .attribute(Attribute::string(PACKAGE_NAMESPACE, package.clone()))
                .attribute(Attribute::version("version", package_version.clone()))
                .attribute(Attribute::string("bundle-symbolic-name", name.clone()))
                .attribute(Attribute::version("bundle-version", version.clone()));
            if let Some(uses) = clause.directive("uses") {
                capability = capability.directive("uses", uses);
            }
            capabilities.push(capability);
        }
    }

    for clause in manifest.clauses(IMPORT_PACKAGE) {
        for package in &clause.paths {
            requirements.push(requirement(PACKAGE_NAMESPACE, package, "version", &clause));
        }
    }

    for clause in manifest.clauses(REQUIRE_BUNDLE) {
        for bundle in &clause.paths {
            requirements.push(requirement(
                BUNDLE_NAMESPACE,
                bundle,
                "bundle-version",
                &clause,
            ));
        }
    }

    Ok(ArtifactMetadata {
        identity: ArtifactIdentity::new(name, version),
        kind,
        capabilities,
        requirements,
    })
}

/// A requirement on `target` in `namespace`, constrained by the clause's
/// `version_attribute` range when one is present.
fn requirement(
    namespace: &str,
    target: &str,
    version_attribute: &str,
    clause: &HeaderClause,
) -> Clause {
    let name_filter = format!("({namespace}={})", escape_filter_value(target));
    let range = clause.attribute(version_attribute).and_then(|text| {
        VersionRange::parse(text)
            .map_err(|err| {
                tracing::warn!(
                    target: "rivershark.obr",
                    namespace,
                    target_name = target,
                    error = %err,
                    "ignoring unparseable version range"
                );
            })
            .ok()
    });
    let filter = match range {
        Some(range) => format!("(&{name_filter}{})", range.to_filter(version_attribute)),
        None => name_filter,
    };

    let mut requirement = Clause::new(namespace).directive("filter", filter);
    // `Require-Bundle` spells it `resolution:=optional` too.
    if clause.directive("resolution") == Some("optional") {
        requirement = requirement.directive("resolution", "optional");
    }
    requirement
}

fn lenient_version(bundle: &str, header: &'static str, text: &str) -> Option<BundleVersion> {
    BundleVersion::parse(text)
        .map_err(|err| {
            tracing::warn!(
                target: "rivershark.obr",
                bundle,
                header,
                error = %err,
                "ignoring unparseable version attribute"
            );
        })
        .ok()
}

fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// The set of supported formats. A file is handed to the first reader that
/// accepts its header.
pub struct ArtifactReaders {
    readers: Vec<Box<dyn ArtifactReader>>,
}

impl ArtifactReaders {
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    pub fn with(mut self, reader: impl ArtifactReader + 'static) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    fn read_header(path: &Path) -> Result<Vec<u8>, InvalidArtifactReason> {
        let unreadable = |err: std::io::Error| InvalidArtifactReason::Unreadable {
            message: err.to_string(),
        };

        let meta = std::fs::metadata(path).map_err(unreadable)?;
        if !meta.is_file() {
            return Err(InvalidArtifactReason::NotAFile);
        }

        let mut header = Vec::with_capacity(HEADER_LEN);
        File::open(path)
            .map_err(unreadable)?
            .take(HEADER_LEN as u64)
            .read_to_end(&mut header)
            .map_err(unreadable)?;
        Ok(header)
    }
}

impl Default for ArtifactReaders {
    fn default() -> Self {
        Self::empty().with(BundleManifestReader)
    }
}

impl std::fmt::Debug for ArtifactReaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.readers.iter().map(|reader| reader.format()))
            .finish()
    }
}

impl ArtifactReader for ArtifactReaders {
    fn format(&self) -> &'static str {
        "any"
    }

    fn accepts(&self, path: &Path, header: &[u8]) -> bool {
        self.readers
            .iter()
            .any(|reader| reader.accepts(path, header))
    }

    fn read(&self, path: &Path) -> Result<ArtifactMetadata, InvalidArtifactReason> {
        let header = Self::read_header(path)?;
        let reader = self
            .readers
            .iter()
            .find(|reader| reader.accepts(path, &header))
            .ok_or(InvalidArtifactReason::UnsupportedFormat)?;

        tracing::trace!(
            target: "rivershark.obr",
            path = %path.display(),
            format = reader.format(),
            "reading artifact"
        );
        let metadata = reader.read(path)?;
        metadata.check()?;
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeValue;

    fn manifest(text: &str) -> Manifest {
        Manifest::parse(text.as_bytes())
    }

    #[test]
    fn identity_requires_name_and_version() {
        assert_eq!(
            metadata_from_manifest(&manifest("Bundle-Version: 1.0\n")),
            Err(InvalidArtifactReason::MissingIdentity)
        );
        assert_eq!(
            metadata_from_manifest(&manifest("Bundle-SymbolicName: a.b\n")),
            Err(InvalidArtifactReason::MissingIdentity)
        );
    }

    #[test]
    fn unparseable_version_names_the_value() {
        let err = metadata_from_manifest(&manifest(
            "Bundle-SymbolicName: a.b\nBundle-Version: one.two\n",
        ))
        .unwrap_err();
        assert!(
            matches!(&err, InvalidArtifactReason::UnparseableVersion { value, .. } if value == "one.two"),
            "{err:?}"
        );
    }

    #[test]
    fn path_like_symbolic_names_are_rejected() {
        let err = metadata_from_manifest(&manifest(
            "Bundle-SymbolicName: ../../etc\nBundle-Version: 1\n",
        ))
        .unwrap_err();
        assert!(matches!(err, InvalidArtifactReason::InvalidSymbolicName { .. }));
    }

    #[test]
    fn derives_capabilities_and_requirements() {
        let metadata = metadata_from_manifest(&manifest(
            "Bundle-SymbolicName: com.example.widget;singleton:=true\n\
             Bundle-Version: 1.2\n\
             Export-Package: com.example.widget.api;version=\"1.1\";uses:=\"org.slf4j\"\n\
             Import-Package: org.slf4j;version=\"[2.0,3)\",javax.annotation;resolution:=optional\n\
             Require-Bundle: com.example.base;bundle-version=1.0\n",
        ))
        .unwrap();

        assert_eq!(
            metadata.identity,
            ArtifactIdentity::new("com.example.widget", BundleVersion::new(1, 2, 0))
        );
        assert_eq!(metadata.kind, ArtifactKind::Bundle);

        let namespaces: Vec<_> = metadata
            .capabilities
            .iter()
            .map(|c| c.namespace.as_str())
            .collect();
        assert_eq!(
            namespaces,
            [IDENTITY_NAMESPACE, BUNDLE_NAMESPACE, HOST_NAMESPACE, PACKAGE_NAMESPACE]
        );
        assert_eq!(metadata.capabilities[0].find_directive("singleton"), Some("true"));

        let export = &metadata.capabilities[3];
        assert_eq!(
            export.find_attribute("version"),
            Some(&AttributeValue::Version(BundleVersion::new(1, 1, 0)))
        );
        assert_eq!(export.find_directive("uses"), Some("org.slf4j"));

        let filters: Vec<_> = metadata
            .requirements
            .iter()
            .map(|r| r.find_directive("filter").unwrap())
            .collect();
        assert_eq!(
            filters,
            [
                "(&(osgi.wiring.package=org.slf4j)(version>=2.0.0)(!(version>=3.0.0)))",
                "(osgi.wiring.package=javax.annotation)",
                "(&(osgi.wiring.bundle=com.example.base)(bundle-version>=1.0.0))",
            ]
        );
        assert_eq!(metadata.requirements[1].find_directive("resolution"), Some("optional"));
    }

    #[test]
    fn fragments_require_their_host() {
        let metadata = metadata_from_manifest(&manifest(
            "Bundle-SymbolicName: com.example.widget.nl\n\
             Bundle-Version: 1.0.0\n\
             Fragment-Host: com.example.widget;bundle-version=\"[1.0,2.0)\"\n",
        ))
        .unwrap();

        assert_eq!(metadata.kind, ArtifactKind::Fragment);
        assert_eq!(metadata.capabilities.len(), 1);
        assert_eq!(
            metadata.capabilities[0].find_attribute("type"),
            Some(&AttributeValue::String("osgi.fragment".to_owned()))
        );
        assert_eq!(metadata.requirements[0].namespace, HOST_NAMESPACE);
    }

    #[test]
    fn unsupported_and_missing_files_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let png = tmp.path().join("sunflower.png");
        std::fs::write(&png, b"\x89PNG\r\n\x1a\nrest").unwrap();

        let readers = ArtifactReaders::default();
        assert_eq!(readers.read(&png), Err(InvalidArtifactReason::UnsupportedFormat));
        assert_eq!(readers.read(tmp.path()), Err(InvalidArtifactReason::NotAFile));
        assert!(matches!(
            readers.read(&tmp.path().join("missing.jar")),
            Err(InvalidArtifactReason::Unreadable { .. })
        ));
    }
}
