//! XML tree, strict parser, compact writer and exclusive canonicalization.
//!
//! The signing and validation code works on an owned tree rather than on
//! events so that namespace reconciliation and sibling ordering can be done
//! in one pass. Everything here is protocol-agnostic; SIFEN names live in
//! [`names`].

pub mod c14n;
pub mod node;
pub mod parse;
pub mod write;

pub use c14n::{canonical_bytes, canonicalize};
pub use node::{Attribute, Element, NamespaceDecl, Node, NsScope, QName};
pub use parse::{has_inter_tag_whitespace, parse_document, Document};
pub use write::{to_document_string, to_fragment_string, XML_DECLARATION};

/// Namespace bound to the reserved `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Protocol element names, namespaces and algorithm identifiers
pub mod names {
    /// SIFEN business namespace
    pub const SIFEN_NS: &str = "http://ekuatia.set.gov.py/sifen/xsd";
    /// XML digital signature namespace
    pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
    /// SOAP 1.2 envelope namespace
    pub const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

    pub const ENVELOPE: &str = "rDE";
    pub const VERSION_MARKER: &str = "dVerFor";
    pub const BUSINESS: &str = "DE";
    pub const ID_ATTR: &str = "Id";
    pub const SIGNATURE: &str = "Signature";
    pub const QR_BLOCK: &str = "gCamFuFD";
    pub const BATCH: &str = "rLoteDE";
    pub const SUBMISSION_ID: &str = "dId";
    pub const PAYLOAD: &str = "xDE";
    pub const ARCHIVE_ENTRY: &str = "lote.xml";

    /// Elements that belong to the transport envelope and never to a batch
    pub const FORBIDDEN_IN_BATCH: [&str; 2] = [SUBMISSION_ID, PAYLOAD];

    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
}
