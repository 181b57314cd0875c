//! Authority response codes
//!
//! The closed table of result codes the pipeline understands. Anything
//! outside it is a protocol error, never a success.

use crate::domain::SifenError;
use std::fmt;

/// Known SIFEN result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// 0300: lot received and queued
    LotQueued,
    /// 0301: lot not queued
    LotNotQueued,
    /// 0160: malformed XML
    MalformedXml,
    /// 0360: lot unknown or query window expired
    LotExpired,
    /// 0361: lot still processing
    LotProcessing,
    /// 0362: lot processing concluded
    LotConcluded,
    /// 0364: lot too old to query by number; query each document by CDC
    LotRequiresCdc,
    /// 0420: document not found
    DocumentNotFound,
    /// 0422: document found
    DocumentFound,
    /// 0500: tax id not found
    TaxpayerNotFound,
    /// 0501: caller may not query the taxpayer registry
    TaxpayerNoPermission,
    /// 0502: taxpayer found
    TaxpayerFound,
}

impl ResponseCode {
    /// Every known code
    pub const ALL: [ResponseCode; 12] = [
        Self::LotQueued,
        Self::LotNotQueued,
        Self::MalformedXml,
        Self::LotExpired,
        Self::LotProcessing,
        Self::LotConcluded,
        Self::LotRequiresCdc,
        Self::DocumentNotFound,
        Self::DocumentFound,
        Self::TaxpayerNotFound,
        Self::TaxpayerNoPermission,
        Self::TaxpayerFound,
    ];

    /// Four-digit wire value
    pub fn code(self) -> &'static str {
        match self {
            Self::LotQueued => "0300",
            Self::LotNotQueued => "0301",
            Self::MalformedXml => "0160",
            Self::LotExpired => "0360",
            Self::LotProcessing => "0361",
            Self::LotConcluded => "0362",
            Self::LotRequiresCdc => "0364",
            Self::DocumentNotFound => "0420",
            Self::DocumentFound => "0422",
            Self::TaxpayerNotFound => "0500",
            Self::TaxpayerNoPermission => "0501",
            Self::TaxpayerFound => "0502",
        }
    }

    /// Looks up a wire value
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Looks up a wire value, failing with a protocol error for unknown codes
    pub fn parse(code: &str, message: &str) -> Result<Self, SifenError> {
        Self::from_code(code).ok_or_else(|| {
            SifenError::Protocol(format!("unknown response code '{}': {message}", code.trim()))
        })
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
