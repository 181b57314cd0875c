//! SIFEN web service adapter
//!
//! Builds the SOAP envelopes, classifies the response codes and talks to the
//! authority over mutually authenticated TLS.
//!
//! # Modules
//!
//! - [`client`] - reqwest-based [`SoapTransportClient`]
//! - [`codes`] - response code table
//! - [`endpoints`] - per-environment service URLs
//! - [`envelopes`] - request envelope builders
//! - [`responses`] - response parsers
//! - [`transport`] - the [`SifenTransport`] trait and its result types

pub mod client;
pub mod codes;
pub mod endpoints;
pub mod envelopes;
pub mod responses;
pub mod transport;

pub use client::SoapTransportClient;
pub use codes::ResponseCode;
pub use endpoints::SifenEndpoints;
pub use transport::{
    BatchOutcome, BatchQueryResult, DocumentQueryResult, DocumentResult, SifenTransport,
    SubmitOutcome, SubmitRequest, SubmitResult, TaxpayerStatus,
};
