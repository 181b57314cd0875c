//! PKCS#12 signing identity

use crate::config::{secret_string, SecretString};
use crate::domain::{EkuatiaError, Result, TaxId};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::{X509NameRef, X509};
use secrecy::ExposeSecret;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Private key and leaf certificate loaded from a PKCS#12 container
///
/// Loaded once per session. The container bytes and the password are kept so
/// the transport can hand the same identity to the TLS layer; both are wiped
/// when the identity is dropped.
pub struct CertificateIdentity {
    key: PKey<Private>,
    certificate: X509,
    container: Zeroizing<Vec<u8>>,
    password: SecretString,
}

impl fmt::Debug for CertificateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateIdentity")
            .field("subject", &self.subject())
            .field("not_after", &self.not_after())
            .finish_non_exhaustive()
    }
}

impl CertificateIdentity {
    /// Decodes a PKCS#12 container
    ///
    /// # Arguments
    ///
    /// * `p12` - DER-encoded container bytes
    /// * `password` - Container password
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::InvalidCredential` on a wrong password or a
    /// corrupt container, and `EkuatiaError::Certificate` if the container
    /// lacks a key or certificate or the two do not belong together.
    pub fn load(p12: &[u8], password: &SecretString) -> Result<Self> {
        let parsed = Pkcs12::from_der(p12)
            .map_err(|e| EkuatiaError::InvalidCredential(format!("not a PKCS#12 container: {e}")))?
            .parse2(password.expose_secret().as_ref())
            .map_err(|e| {
                EkuatiaError::InvalidCredential(format!(
                    "cannot open PKCS#12 container (wrong password?): {e}"
                ))
            })?;

        let key = parsed
            .pkey
            .ok_or_else(|| EkuatiaError::Certificate("container has no private key".to_string()))?;
        let certificate = parsed
            .cert
            .ok_or_else(|| EkuatiaError::Certificate("container has no certificate".to_string()))?;

        let public = certificate
            .public_key()
            .map_err(|e| EkuatiaError::Certificate(format!("unreadable certificate key: {e}")))?;
        if !public.public_eq(&key) {
            return Err(EkuatiaError::Certificate(
                "private key does not match the certificate".to_string(),
            ));
        }

        tracing::debug!(subject = %subject_line(certificate.subject_name()), "Loaded signing identity");

        Ok(Self {
            key,
            certificate,
            container: Zeroizing::new(p12.to_vec()),
            password: secret_string(password.expose_secret().as_ref().to_string()),
        })
    }

    /// Reads and decodes a PKCS#12 file
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::Certificate` if the file cannot be read, plus the
    /// errors of [`CertificateIdentity::load`].
    pub fn from_file(path: impl AsRef<Path>, password: &SecretString) -> Result<Self> {
        let path = path.as_ref();
        let bytes = Zeroizing::new(std::fs::read(path).map_err(|e| {
            EkuatiaError::Certificate(format!("cannot read {}: {e}", path.display()))
        })?);
        Self::load(&bytes, password)
    }

    /// Certificate holder's tax id
    ///
    /// Reads the subject `serialNumber` attribute (`RUC80012345-6` and similar
    /// forms), falling back to the common name. `None` when no attribute holds
    /// a RUC.
    pub fn tax_id(&self) -> Option<TaxId> {
        let subject = self.certificate.subject_name();
        [Nid::SERIALNUMBER, Nid::COMMONNAME]
            .into_iter()
            .flat_map(|nid| subject.entries_by_nid(nid))
            .filter_map(|entry| entry.data().as_utf8().ok())
            .find_map(|value| TaxId::new(value.to_string()).ok())
    }

    /// Signs `data` with RSA-SHA256 (PKCS#1 v1.5)
    ///
    /// # Errors
    ///
    /// Returns `EkuatiaError::Certificate` if the key cannot sign.
    pub fn sign_sha256(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)
            .map_err(|e| EkuatiaError::Certificate(format!("key cannot sign: {e}")))?;
        signer
            .update(data)
            .map_err(|e| EkuatiaError::Certificate(format!("signing failed: {e}")))?;
        signer
            .sign_to_vec()
            .map_err(|e| EkuatiaError::Certificate(format!("signing failed: {e}")))
    }

    /// Leaf certificate, DER-encoded
    pub fn certificate_der(&self) -> Result<Vec<u8>> {
        self.certificate
            .to_der()
            .map_err(|e| EkuatiaError::Certificate(format!("cannot encode certificate: {e}")))
    }

    /// Leaf certificate as single-line base64, as embedded in `X509Certificate`
    pub fn certificate_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.certificate_der()?))
    }

    /// Leaf certificate, PEM-encoded
    pub fn certificate_pem(&self) -> Result<Vec<u8>> {
        self.certificate
            .to_pem()
            .map_err(|e| EkuatiaError::Certificate(format!("cannot encode certificate: {e}")))
    }

    /// Private key as PKCS#8 PEM, wiped when dropped
    pub fn private_key_pem(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.key
            .private_key_to_pem_pkcs8()
            .map(Zeroizing::new)
            .map_err(|e| EkuatiaError::Certificate(format!("cannot encode private key: {e}")))
    }

    /// Original container bytes and password, for TLS layers that take PKCS#12
    pub fn pkcs12(&self) -> (&[u8], &str) {
        (&self.container, self.password.expose_secret().as_ref())
    }

    /// Subject distinguished name, one `key=value` per attribute
    pub fn subject(&self) -> String {
        subject_line(self.certificate.subject_name())
    }

    /// Issuer distinguished name
    pub fn issuer(&self) -> String {
        subject_line(self.certificate.issuer_name())
    }

    /// Start of the validity period
    pub fn not_before(&self) -> String {
        self.certificate.not_before().to_string()
    }

    /// End of the validity period
    pub fn not_after(&self) -> String {
        self.certificate.not_after().to_string()
    }
}

fn subject_line(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|v| v.to_string())
                .unwrap_or_default();
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
