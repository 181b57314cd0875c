//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ekuatia::adapters::sifen::{
    BatchOutcome, BatchQueryResult, DocumentQueryResult, ResponseCode, SifenTransport,
    SubmitOutcome, SubmitRequest, SubmitResult, TaxpayerStatus,
};
use ekuatia::config::secret_string;
use ekuatia::core::certificate::CertificateIdentity;
use ekuatia::domain::{Cdc, Result, SifenError, TaxId, TrackingNumber};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

pub const TEST_CDC: &str = "01800123456001001000000120250101123456789";
pub const SECOND_CDC: &str = "01800123456001001000000220250101123456781";
pub const SIFEN_NS: &str = "http://ekuatia.set.gov.py/sifen/xsd";
pub const PASSWORD: &str = "integration-pass";

/// Self-signed RSA-2048 PKCS#12 with subject serialNumber `serial`
pub fn pkcs12(serial: &str) -> Vec<u8> {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "EMPRESA DE PRUEBA")
        .unwrap();
    name.append_entry_by_nid(Nid::SERIALNUMBER, serial).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    Pkcs12::builder()
        .name("ekuatia-integration")
        .pkey(&key)
        .cert(&cert)
        .build2(PASSWORD)
        .unwrap()
        .to_der()
        .unwrap()
}

/// Identity for RUC 80012345-6, generated once per test binary
pub fn identity() -> Arc<CertificateIdentity> {
    static IDENTITY: OnceLock<Arc<CertificateIdentity>> = OnceLock::new();
    IDENTITY
        .get_or_init(|| {
            let p12 = pkcs12("RUC80012345-6");
            Arc::new(CertificateIdentity::load(&p12, &secret_string(PASSWORD.to_string())).unwrap())
        })
        .clone()
}

/// Unsigned `DE` issued by RUC 80012345-6
pub fn unsigned_document(cdc: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<DE xmlns="{SIFEN_NS}" Id="{cdc}">
  <dDVId>9</dDVId>
  <dFecFirma>2025-01-01T12:00:00</dFecFirma>
  <gEmis>
    <dRucEm>80012345</dRucEm>
    <dDVEmi>6</dDVEmi>
    <dNomEmi>EMPRESA DE PRUEBA</dNomEmi>
  </gEmis>
</DE>"#
    )
}

/// Scripted transport recording every call
#[derive(Default)]
pub struct MockTransport {
    pub submit_answers: Mutex<VecDeque<(ResponseCode, Option<&'static str>)>>,
    pub batch_answers: Mutex<VecDeque<ResponseCode>>,
    pub submitted: Mutex<Vec<String>>,
    pub batch_queries: Mutex<Vec<String>>,
    pub taxpayer_queries: Mutex<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, code: ResponseCode, tracking: Option<&'static str>) -> Self {
        self.submit_answers
            .lock()
            .unwrap()
            .push_back((code, tracking));
        self
    }

    pub fn on_query(self, codes: &[ResponseCode]) -> Self {
        self.batch_answers.lock().unwrap().extend(codes.iter().copied());
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn query_count(&self) -> usize {
        self.batch_queries.lock().unwrap().len()
    }
}

#[async_trait]
impl SifenTransport for MockTransport {
    async fn submit_batch(&self, request: &SubmitRequest) -> Result<SubmitResult> {
        self.submitted
            .lock()
            .unwrap()
            .push(request.envelope().to_string());
        let (code, tracking) = self
            .submit_answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SifenError::ConnectionFailed("no scripted submit answer".into()))?;
        let outcome = match code {
            ResponseCode::LotQueued => {
                SubmitOutcome::Queued(TrackingNumber::new(tracking.unwrap_or("1")).unwrap())
            }
            _ => SubmitOutcome::NotQueued,
        };
        Ok(SubmitResult {
            outcome,
            code,
            message: format!("scripted {code}"),
            processing_time: None,
        })
    }

    async fn query_batch_status(&self, tracking: &TrackingNumber) -> Result<BatchQueryResult> {
        self.batch_queries
            .lock()
            .unwrap()
            .push(tracking.to_string());
        let code = self
            .batch_answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SifenError::Timeout("no scripted query answer".into()))?;
        Ok(BatchQueryResult {
            outcome: BatchOutcome::from_code(code).unwrap(),
            code,
            message: format!("scripted {code}"),
            documents: Vec::new(),
        })
    }

    async fn query_taxpayer_status(&self, _tax_id: &TaxId) -> Result<TaxpayerStatus> {
        *self.taxpayer_queries.lock().unwrap() += 1;
        Ok(TaxpayerStatus {
            code: ResponseCode::TaxpayerFound,
            message: "RUC encontrado".to_string(),
            name: Some("EMPRESA DE PRUEBA".to_string()),
            registry_status: Some("ACTIVO".to_string()),
            authorized: true,
        })
    }

    async fn query_document(&self, _cdc: &Cdc) -> Result<DocumentQueryResult> {
        Ok(DocumentQueryResult {
            code: ResponseCode::DocumentFound,
            message: "CDC encontrado".to_string(),
            found: true,
        })
    }
}
