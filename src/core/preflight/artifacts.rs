//! Postmortem artifacts for aborted submissions

use crate::domain::{EkuatiaError, Result, SubmissionId};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Intermediate products of one submission attempt
///
/// Every field is optional; an abort persists whatever was produced before
/// the failing stage.
#[derive(Debug, Clone, Default)]
pub struct ArtifactBundle {
    /// Caller input, one entry per document
    pub unsigned: Vec<Vec<u8>>,
    /// Signed documents, one entry per document
    pub signed: Vec<String>,
    pub batch_xml: Option<String>,
    pub archive: Option<Vec<u8>>,
    pub payload: Option<String>,
    /// The SOAP envelope that would have been sent
    pub envelope: Option<String>,
    /// One line per violation or error
    pub violations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    submission_id: &'a str,
    created_at: String,
    files: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    name: String,
    bytes: usize,
    sha256: String,
}

/// Writes bundles under `<root>/<submission id>/`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists a bundle and returns its directory
    ///
    /// A `manifest.json` with the size and SHA-256 of every file is written
    /// last.
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::Io` if the directory or a file cannot be written.
    pub fn persist(&self, submission_id: &SubmissionId, bundle: &ArtifactBundle) -> Result<PathBuf> {
        let dir = self.root.join(submission_id.as_str());
        std::fs::create_dir_all(&dir).map_err(|e| {
            EkuatiaError::Io(format!(
                "Failed to create artifacts directory {}: {e}",
                dir.display()
            ))
        })?;

        let violations = bundle.violations.join("\n");
        let mut files: Vec<(String, &[u8])> = Vec::new();
        for (name, contents) in numbered("unsigned", "xml", &bundle.unsigned) {
            files.push((name, contents));
        }
        for (name, contents) in numbered("signed", "xml", &bundle.signed) {
            files.push((name, contents));
        }
        if let Some(xml) = &bundle.batch_xml {
            files.push(("batch.xml".to_string(), xml.as_bytes()));
        }
        if let Some(archive) = &bundle.archive {
            files.push(("batch.zip".to_string(), archive.as_slice()));
        }
        if let Some(payload) = &bundle.payload {
            files.push(("payload.b64".to_string(), payload.as_bytes()));
        }
        if let Some(envelope) = &bundle.envelope {
            files.push(("envelope.xml".to_string(), envelope.as_bytes()));
        }
        if !bundle.violations.is_empty() {
            files.push(("violations.txt".to_string(), violations.as_bytes()));
        }

        let mut manifest = Manifest {
            submission_id: submission_id.as_str(),
            created_at: Utc::now().to_rfc3339(),
            files: Vec::with_capacity(files.len()),
        };
        for (name, contents) in files {
            let path = dir.join(&name);
            std::fs::write(&path, contents).map_err(|e| {
                EkuatiaError::Io(format!("Failed to write artifact {}: {e}", path.display()))
            })?;
            manifest.files.push(ManifestEntry {
                name,
                bytes: contents.len(),
                sha256: format!("{:x}", Sha256::digest(contents)),
            });
        }
        std::fs::write(dir.join("manifest.json"), serde_json::to_vec_pretty(&manifest)?)?;

        tracing::warn!(
            submission_id = %submission_id,
            files = manifest.files.len(),
            path = %dir.display(),
            "Persisted submission artifacts"
        );
        Ok(dir)
    }
}

/// `name.ext` for a single item, `name-1.ext`, `name-2.ext`... otherwise
fn numbered<'a, T: AsRef<[u8]>>(
    stem: &'a str,
    ext: &'a str,
    items: &'a [T],
) -> impl Iterator<Item = (String, &'a [u8])> + 'a {
    let single = items.len() == 1;
    items.iter().enumerate().map(move |(i, item)| {
        let name = if single {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}-{}.{ext}", i + 1)
        };
        (name, item.as_ref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id() -> SubmissionId {
        SubmissionId::new("250101123456789").unwrap()
    }

    #[test]
    fn test_full_bundle_layout() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let bundle = ArtifactBundle {
            unsigned: vec![b"<DE/>".to_vec()],
            signed: vec!["<rDE/>".to_string()],
            batch_xml: Some("<rLoteDE/>".to_string()),
            archive: Some(vec![0x50, 0x4b]),
            payload: Some("UEs=".to_string()),
            envelope: Some("<env:Envelope/>".to_string()),
            violations: vec!["batch contains no rDE documents".to_string()],
        };

        let dir = store.persist(&id(), &bundle).unwrap();
        assert_eq!(dir, temp.path().join("250101123456789"));
        for name in [
            "unsigned.xml",
            "signed.xml",
            "batch.xml",
            "batch.zip",
            "payload.b64",
            "envelope.xml",
            "violations.txt",
            "manifest.json",
        ] {
            assert!(dir.join(name).exists(), "{name} missing");
        }
        assert_eq!(std::fs::read(dir.join("batch.zip")).unwrap(), vec![0x50, 0x4b]);

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["files"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn test_multiple_documents_are_numbered() {
        let temp = TempDir::new().unwrap();
        let bundle = ArtifactBundle {
            unsigned: vec![b"<DE Id='1'/>".to_vec(), b"<DE Id='2'/>".to_vec()],
            ..Default::default()
        };
        let dir = ArtifactStore::new(temp.path()).persist(&id(), &bundle).unwrap();
        assert!(dir.join("unsigned-1.xml").exists());
        assert!(dir.join("unsigned-2.xml").exists());
        assert!(!dir.join("unsigned.xml").exists());
        assert!(!dir.join("violations.txt").exists());
    }
}
