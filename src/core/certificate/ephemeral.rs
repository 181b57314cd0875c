//! Process-private key files for TLS layers that only accept paths

use super::CertificateIdentity;
use crate::domain::{EkuatiaError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// PEM key and certificate written to exclusive temporary files
///
/// The files are created with owner-only permissions and removed when the
/// guard is dropped, including on every error path while writing them.
#[derive(Debug)]
pub struct EphemeralKeyFiles {
    key: NamedTempFile,
    certificate: NamedTempFile,
}

impl EphemeralKeyFiles {
    /// Writes the identity's key and certificate
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::Io` if a file cannot be created or written.
    pub fn write(identity: &CertificateIdentity) -> Result<Self> {
        let key_pem = identity.private_key_pem()?;
        let cert_pem = identity.certificate_pem()?;

        let key = write_private(&key_pem, "ekuatia-key-")?;
        let certificate = write_private(&cert_pem, "ekuatia-cert-")?;

        tracing::debug!(
            key_path = %key.path().display(),
            cert_path = %certificate.path().display(),
            "Wrote ephemeral key material"
        );

        Ok(Self { key, certificate })
    }

    /// Path of the PKCS#8 PEM private key
    pub fn key_path(&self) -> &Path {
        self.key.path()
    }

    /// Path of the PEM certificate
    pub fn certificate_path(&self) -> &Path {
        self.certificate.path()
    }
}

fn write_private(contents: &[u8], prefix: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".pem")
        .tempfile()
        .map_err(|e| EkuatiaError::Io(format!("cannot create key file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}
