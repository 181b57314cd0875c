//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that travel through the pipeline.
//! Each type validates its format on construction.

use chrono::Local;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Document check-digit code (CDC)
///
/// The unique identifier of a tax document, carried as the `Id` attribute of
/// the `DE` element and used as the signature reference target.
///
/// # Examples
///
/// ```
/// use ekuatia::domain::ids::Cdc;
///
/// let cdc = Cdc::new("01800123456001001000000120250101123456789").unwrap();
/// assert_eq!(cdc.reference_uri(), "#01800123456001001000000120250101123456789");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cdc(String);

impl Cdc {
    /// Creates a new Cdc from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(Cdc)` if the code is non-empty and contains no whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("CDC cannot be empty".to_string());
        }
        if id.chars().any(char::is_whitespace) {
            return Err(format!("CDC '{id}' contains whitespace"));
        }
        Ok(Self(id))
    }

    /// Returns the CDC as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Same-document reference used by the signature (`#<cdc>`)
    pub fn reference_uri(&self) -> String {
        format!("#{}", self.0)
    }

    /// Issuer tax id embedded in the code
    ///
    /// A numeric CDC carries the document type in positions 0..2, the issuer
    /// RUC in 2..10 and its check digit at 10.
    pub fn embedded_tax_id(&self) -> Option<TaxId> {
        let bytes = self.0.as_bytes();
        if bytes.len() < 11 || !self.0.is_ascii() || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let number = self.0[2..10].trim_start_matches('0');
        TaxId::from_parts(number, self.0[10..11].chars().next()).ok()
    }
}

impl fmt::Display for Cdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cdc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Cdc {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Taxpayer identifier (RUC) with optional check digit
///
/// Accepts the forms found in certificates and documents:
/// `80012345-6`, `RUC80012345-6`, `RUC 80012345-6` and `80012345`.
///
/// # Examples
///
/// ```
/// use ekuatia::domain::ids::TaxId;
/// use std::str::FromStr;
///
/// let ruc = TaxId::from_str("RUC80012345-6").unwrap();
/// assert_eq!(ruc.number(), "80012345");
/// assert_eq!(ruc.check_digit(), Some('6'));
/// assert_eq!(ruc.to_string(), "80012345-6");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxId {
    number: String,
    check_digit: Option<char>,
}

fn tax_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i:RUC)?\s*0*(\d{3,8})(?:-?(\d))?$").expect("tax id pattern is valid")
    })
}

impl TaxId {
    /// Parses a tax id from any accepted textual form
    pub fn new(raw: impl AsRef<str>) -> Result<Self, String> {
        let raw = raw.as_ref().trim();
        let caps = tax_id_pattern()
            .captures(raw)
            .ok_or_else(|| format!("'{raw}' is not a RUC"))?;
        let number = caps[1].to_string();
        let check_digit = caps.get(2).and_then(|m| m.as_str().chars().next());
        Ok(Self {
            number,
            check_digit,
        })
    }

    /// Builds a tax id from its number and optional check digit
    pub fn from_parts(number: &str, check_digit: Option<char>) -> Result<Self, String> {
        match check_digit {
            Some(dv) => Self::new(format!("{number}-{dv}")),
            None => Self::new(number),
        }
    }

    /// The RUC number without check digit
    pub fn number(&self) -> &str {
        &self.number
    }

    /// The check digit, when known
    pub fn check_digit(&self) -> Option<char> {
        self.check_digit
    }

    /// Whether two tax ids denote the same taxpayer
    ///
    /// Check digits are compared only when both sides carry one.
    pub fn matches(&self, other: &TaxId) -> bool {
        if self.number != other.number {
            return false;
        }
        match (self.check_digit, other.check_digit) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.check_digit {
            Some(dv) => write!(f, "{}-{}", self.number, dv),
            None => write!(f, "{}", self.number),
        }
    }
}

impl FromStr for TaxId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Locally generated submission identifier (`dId`)
///
/// Fixed-length, 15 numeric digits derived from the local timestamp
/// (`yyMMddHHmmssSSS`). Identifiers produced by [`SubmissionId::generate`]
/// are strictly increasing within a process, so they are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(String);

/// Length of every submission identifier
pub const SUBMISSION_ID_LEN: usize = 15;

static LAST_SUBMISSION_ID: AtomicU64 = AtomicU64::new(0);

impl SubmissionId {
    /// Generates a fresh identifier
    pub fn generate() -> Self {
        let stamp: u64 = Local::now()
            .format("%y%m%d%H%M%S%3f")
            .to_string()
            .parse()
            .unwrap_or(0);

        let mut last = LAST_SUBMISSION_ID.load(Ordering::SeqCst);
        loop {
            let next = stamp.max(last + 1);
            match LAST_SUBMISSION_ID.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Self(format!("{next:0width$}", width = SUBMISSION_ID_LEN)),
                Err(current) => last = current,
            }
        }
    }

    /// Wraps an existing identifier
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.len() != SUBMISSION_ID_LEN || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!(
                "Submission id must be {SUBMISSION_ID_LEN} digits, got '{id}'"
            ));
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubmissionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Authority-issued batch tracking number (`dProtConsLote`)
///
/// A tracking number of `0` means the batch was not queued, so it is not a
/// valid tracking number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingNumber(String);

impl TrackingNumber {
    /// Creates a tracking number, rejecting empty, zero and non-numeric values
    pub fn new(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("Invalid tracking number '{raw}'"));
        }
        if trimmed.bytes().all(|b| b == b'0') {
            return Err("Tracking number 0 means the batch was not queued".to_string());
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the tracking number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackingNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
