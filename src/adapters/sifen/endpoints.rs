//! Web service locations per environment

use crate::config::{EndpointOverrides, Environment};

const TEST_BASE: &str = "https://sifen-test.set.gov.py";
const PRODUCTION_BASE: &str = "https://sifen.set.gov.py";

const SUBMIT_BATCH_PATH: &str = "/de/ws/async/recibe-lote.wsdl";
const QUERY_BATCH_PATH: &str = "/de/ws/consultas/consulta-lote.wsdl";
const QUERY_TAXPAYER_PATH: &str = "/de/ws/consultas/consulta-ruc.wsdl";
const QUERY_DOCUMENT_PATH: &str = "/de/ws/consultas/consulta.wsdl";

/// Resolved URL of every service the client calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SifenEndpoints {
    pub submit_batch: String,
    pub query_batch: String,
    pub query_taxpayer: String,
    pub query_document: String,
}

impl SifenEndpoints {
    /// Environment defaults with per-service overrides applied
    pub fn resolve(environment: Environment, overrides: &EndpointOverrides) -> Self {
        let base = match environment {
            Environment::Test => TEST_BASE,
            Environment::Production => PRODUCTION_BASE,
        };
        let pick = |over: &Option<String>, path: &str| {
            over.clone().unwrap_or_else(|| format!("{base}{path}"))
        };
        Self {
            submit_batch: pick(&overrides.submit_batch, SUBMIT_BATCH_PATH),
            query_batch: pick(&overrides.query_batch, QUERY_BATCH_PATH),
            query_taxpayer: pick(&overrides.query_taxpayer, QUERY_TAXPAYER_PATH),
            query_document: pick(&overrides.query_document, QUERY_DOCUMENT_PATH),
        }
    }
}
