use std::path::Path;

use rivershark_config::RepositoryConfig;
use rivershark_obr::{
    read_index, ArtifactIdentity, ArtifactKind, ArtifactMetadata, ArtifactReader, ArtifactReaders,
    Attribute, BundleVersion, Clause, InvalidArtifactReason, Repository, IDENTITY_NAMESPACE,
};
use rivershark_test_utils::BundleJar;
use tempfile::TempDir;

/// Reads `name=...` / `version=...` descriptor files.
struct DescriptorReader;

impl ArtifactReader for DescriptorReader {
    fn format(&self) -> &'static str {
        "descriptor"
    }

    fn accepts(&self, _path: &Path, header: &[u8]) -> bool {
        header.starts_with(b"name=")
    }

    fn read(&self, path: &Path) -> Result<ArtifactMetadata, InvalidArtifactReason> {
        let text = std::fs::read_to_string(path).map_err(|err| InvalidArtifactReason::Unreadable {
            message: err.to_string(),
        })?;
        let field = |key: &str| {
            text.lines()
                .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
                .map(str::trim)
        };
        let name = field("name").ok_or(InvalidArtifactReason::MissingIdentity)?;
        let version_text = field("version").ok_or(InvalidArtifactReason::MissingIdentity)?;
        let version = BundleVersion::parse(version_text).map_err(|source| {
            InvalidArtifactReason::UnparseableVersion {
                value: version_text.to_owned(),
                source,
            }
        })?;

        Ok(ArtifactMetadata {
            identity: ArtifactIdentity::new(name, version.clone()),
            kind: ArtifactKind::Bundle,
            capabilities: vec![Clause::new(IDENTITY_NAMESPACE)
                .attribute(Attribute::string(IDENTITY_NAMESPACE, name))
                .attribute(Attribute::version("version", version))],
            requirements: Vec::new(),
        })
    }
}

#[test]
fn custom_readers_handle_their_own_format() {
    let repo_dir = TempDir::new().unwrap();
    let inputs = TempDir::new().unwrap();
    let descriptor = inputs.path().join("tool.desc");
    std::fs::write(&descriptor, "name=com.example.tool\nversion=0.3\n").unwrap();
    let jar = BundleJar::new("com.example.widget", "1.2.0").write_to(&inputs.path().join("w.jar"));

    let readers = ArtifactReaders::default().with(DescriptorReader);
    let repo = Repository::open_with_readers(RepositoryConfig::builder(repo_dir.path()).build(), readers)
        .unwrap();
    let report = repo.install(&[&descriptor, &jar]).unwrap();

    assert_eq!(report.indexed, 2);
    let index = read_index(repo.layout().index_path()).unwrap();
    let identities: Vec<_> = index
        .resources
        .iter()
        .map(|r| r.identity().unwrap().to_string())
        .collect();
    assert_eq!(identities, ["com.example.tool 0.3.0", "com.example.widget 1.2.0"]);
}

#[test]
fn readers_without_a_match_reject_the_file() {
    let repo_dir = TempDir::new().unwrap();
    let inputs = TempDir::new().unwrap();
    let jar = BundleJar::new("com.example.widget", "1.2.0").write_to(&inputs.path().join("w.jar"));

    let readers = ArtifactReaders::empty().with(DescriptorReader);
    let repo = Repository::open_with_readers(RepositoryConfig::builder(repo_dir.path()).build(), readers)
        .unwrap();
    let err = repo.install(&[jar]).unwrap_err();

    assert_eq!(
        err.invalid_artifacts()[0].reason,
        InvalidArtifactReason::UnsupportedFormat
    );
}

#[test]
fn reader_supplied_names_cannot_leave_storage() {
    let root = TempDir::new().unwrap();
    let repo_dir = root.path().join("repo");
    let inputs = TempDir::new().unwrap();
    let descriptor = inputs.path().join("escape.desc");
    std::fs::write(&descriptor, "name=../../escaped\nversion=1.0\n").unwrap();

    let readers = ArtifactReaders::empty().with(DescriptorReader);
    let repo =
        Repository::open_with_readers(RepositoryConfig::builder(&repo_dir).build(), readers).unwrap();
    let err = repo.install(&[&descriptor]).unwrap_err();

    assert_eq!(
        err.invalid_artifacts()[0].reason,
        InvalidArtifactReason::InvalidSymbolicName {
            name: "../../escaped".to_owned()
        }
    );
    assert!(!root.path().join("escaped-1.0.0.jar").exists());
    assert!(!repo_dir.join("escaped-1.0.0.jar").exists());
    assert_eq!(std::fs::read_dir(repo.layout().storage_dir()).unwrap().count(), 0);
}
