//! Response parsing
//!
//! Responses are parsed with the strict parser and located by local name, so
//! the prefixes the server picks do not matter. A SOAP fault is a rejection;
//! anything unreadable is a protocol error.

use super::codes::ResponseCode;
use super::transport::{
    BatchOutcome, BatchQueryResult, DocumentQueryResult, DocumentResult, SubmitOutcome,
    SubmitResult, TaxpayerStatus,
};
use crate::core::xml::{parse_document, Element};
use crate::domain::{Result, SifenError, TrackingNumber};

/// Parses `rResEnviLoteDe`
pub fn parse_submit_response(body: &str) -> Result<SubmitResult> {
    let root = soap_body(body)?;
    let response = locate(&root, "rResEnviLoteDe")?;
    let (code, message) = result_code(response, "dCodRes", "dMsgRes")?;
    let processing_time = child_text(response, "dTpoProces");

    let outcome = match code {
        ResponseCode::LotQueued => {
            let raw = child_text(response, "dProtConsLote").unwrap_or_default();
            let tracking = TrackingNumber::new(raw.as_str()).map_err(|e| {
                SifenError::Protocol(format!("code {code} without a usable tracking number: {e}"))
            })?;
            SubmitOutcome::Queued(tracking)
        }
        ResponseCode::LotNotQueued => SubmitOutcome::NotQueued,
        ResponseCode::MalformedXml => return Err(rejected(code, message)),
        other => {
            return Err(SifenError::Protocol(format!(
                "code {other} is not a submit-batch result: {message}"
            ))
            .into())
        }
    };

    Ok(SubmitResult {
        outcome,
        code,
        message,
        processing_time,
    })
}

/// Parses `rResEnviConsLoteDe`
pub fn parse_batch_response(body: &str) -> Result<BatchQueryResult> {
    let root = soap_body(body)?;
    let response = locate(&root, "rResEnviConsLoteDe")?;
    let (code, message) = result_code(response, "dCodResLot", "dMsgResLot")?;

    if code == ResponseCode::MalformedXml {
        return Err(rejected(code, message));
    }
    let outcome = BatchOutcome::from_code(code).ok_or_else(|| {
        SifenError::Protocol(format!("code {code} is not a lot state: {message}"))
    })?;

    let documents = response
        .descendants("gResProcLote")
        .into_iter()
        .map(|item| DocumentResult {
            cdc: child_text(item, "id").unwrap_or_default(),
            status: child_text(item, "dEstRes").unwrap_or_default(),
            code: item.descendant_text("dCodRes"),
            message: item.descendant_text("dMsgRes"),
        })
        .collect();

    Ok(BatchQueryResult {
        outcome,
        code,
        message,
        documents,
    })
}

/// Parses `rResEnviConsRUC`
pub fn parse_taxpayer_response(body: &str) -> Result<TaxpayerStatus> {
    let root = soap_body(body)?;
    let response = locate(&root, "rResEnviConsRUC")?;
    let (code, message) = result_code(response, "dCodRes", "dMsgRes")?;

    match code {
        ResponseCode::TaxpayerFound => {
            let content = response.find_descendant("xContRUC");
            let field = |name: &str| content.and_then(|c| c.descendant_text(name));
            Ok(TaxpayerStatus {
                code,
                authorized: field("dRUCFactElec").as_deref() == Some("S"),
                name: field("dRazCons"),
                registry_status: field("dDesEstCons"),
                message,
            })
        }
        ResponseCode::TaxpayerNotFound => Ok(TaxpayerStatus {
            code,
            message,
            name: None,
            registry_status: None,
            authorized: false,
        }),
        ResponseCode::TaxpayerNoPermission => {
            Err(SifenError::AuthenticationFailed(format!("{code}: {message}")).into())
        }
        ResponseCode::MalformedXml => Err(rejected(code, message)),
        other => Err(SifenError::Protocol(format!(
            "code {other} is not a taxpayer query result: {message}"
        ))
        .into()),
    }
}

/// Parses `rEnviConsDeResponse`
pub fn parse_document_response(body: &str) -> Result<DocumentQueryResult> {
    let root = soap_body(body)?;
    let response = locate(&root, "rEnviConsDeResponse")?;
    let (code, message) = result_code(response, "dCodRes", "dMsgRes")?;

    let found = match code {
        ResponseCode::DocumentFound => true,
        ResponseCode::DocumentNotFound => false,
        ResponseCode::MalformedXml => return Err(rejected(code, message)),
        other => {
            return Err(SifenError::Protocol(format!(
                "code {other} is not a document query result: {message}"
            ))
            .into())
        }
    };

    Ok(DocumentQueryResult {
        code,
        message,
        found,
    })
}

/// Parses the response and turns a SOAP fault into a rejection
fn soap_body(body: &str) -> Result<Element> {
    let doc = parse_document(body.as_bytes())
        .map_err(|e| SifenError::Protocol(format!("unparsable response: {e}")))?;

    if let Some(fault) = doc.root.find_descendant("Fault") {
        let code = fault
            .find_descendant("Value")
            .map(|v| v.text().trim().to_string())
            .unwrap_or_else(|| "Fault".to_string());
        let message = fault
            .find_descendant("Text")
            .map(|t| t.text().trim().to_string())
            .unwrap_or_default();
        return Err(SifenError::Rejected { code, message }.into());
    }
    Ok(doc.root)
}

fn locate<'a>(root: &'a Element, name: &str) -> Result<&'a Element> {
    if root.local_name() == name {
        return Ok(root);
    }
    root.find_descendant(name)
        .ok_or_else(|| SifenError::Protocol(format!("response has no <{name}>")).into())
}

fn result_code(response: &Element, code: &str, message: &str) -> Result<(ResponseCode, String)> {
    let raw = child_text(response, code)
        .ok_or_else(|| SifenError::Protocol(format!("response has no <{code}>")))?;
    let message = child_text(response, message).unwrap_or_default();
    let code = ResponseCode::parse(&raw, &message)?;
    Ok((code, message))
}

fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .find_child(name)
        .map(|e| e.text().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn rejected(code: ResponseCode, message: String) -> crate::domain::EkuatiaError {
    SifenError::Rejected {
        code: code.code().to_string(),
        message,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EkuatiaError;

    const NS: &str = "http://ekuatia.set.gov.py/sifen/xsd";

    fn soap(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope"><env:Header/><env:Body>{inner}</env:Body></env:Envelope>"#
        )
    }

    fn sifen_error(err: EkuatiaError) -> SifenError {
        match err {
            EkuatiaError::Sifen(e) => e,
            other => panic!("expected SIFEN error, got {other:?}"),
        }
    }

    #[test]
    fn test_submit_queued() {
        let body = soap(&format!(
            r#"<ns2:rResEnviLoteDe xmlns:ns2="{NS}"><ns2:dFecProc>2025-01-01T12:00:00-03:00</ns2:dFecProc><ns2:dCodRes>0300</ns2:dCodRes><ns2:dMsgRes>Lote recibido con éxito</ns2:dMsgRes><ns2:dProtConsLote>123456</ns2:dProtConsLote><ns2:dTpoProces>0</ns2:dTpoProces></ns2:rResEnviLoteDe>"#
        ));
        let result = parse_submit_response(&body).unwrap();
        assert_eq!(
            result.outcome,
            SubmitOutcome::Queued(TrackingNumber::new("123456").unwrap())
        );
        assert_eq!(result.message, "Lote recibido con éxito");
        assert_eq!(result.processing_time.as_deref(), Some("0"));
    }

    #[test]
    fn test_submit_not_queued() {
        let body = soap(&format!(
            r#"<rResEnviLoteDe xmlns="{NS}"><dCodRes>0301</dCodRes><dMsgRes>Lote no encolado</dMsgRes><dProtConsLote>0</dProtConsLote></rResEnviLoteDe>"#
        ));
        let result = parse_submit_response(&body).unwrap();
        assert_eq!(result.outcome, SubmitOutcome::NotQueued);
        assert_eq!(result.code, ResponseCode::LotNotQueued);
    }

    #[test]
    fn test_queued_without_tracking_number_is_protocol_error() {
        let body = soap(&format!(
            r#"<rResEnviLoteDe xmlns="{NS}"><dCodRes>0300</dCodRes><dProtConsLote>0</dProtConsLote></rResEnviLoteDe>"#
        ));
        let err = sifen_error(parse_submit_response(&body).unwrap_err());
        assert!(matches!(err, SifenError::Protocol(_)));
    }

    #[test]
    fn test_malformed_xml_is_rejection() {
        let body = soap(&format!(
            r#"<rResEnviLoteDe xmlns="{NS}"><dCodRes>0160</dCodRes><dMsgRes>XML Mal Formado.</dMsgRes></rResEnviLoteDe>"#
        ));
        match sifen_error(parse_submit_response(&body).unwrap_err()) {
            SifenError::Rejected { code, message } => {
                assert_eq!(code, "0160");
                assert_eq!(message, "XML Mal Formado.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_code_is_protocol_error() {
        let body = soap(&format!(
            r#"<rResEnviLoteDe xmlns="{NS}"><dCodRes>0999</dCodRes></rResEnviLoteDe>"#
        ));
        assert!(matches!(
            sifen_error(parse_submit_response(&body).unwrap_err()),
            SifenError::Protocol(_)
        ));
    }

    #[test]
    fn test_soap_fault_is_rejection() {
        let body = soap(
            "<env:Fault><env:Code><env:Value>env:Receiver</env:Value></env:Code><env:Reason><env:Text xml:lang=\"es\">Error interno</env:Text></env:Reason></env:Fault>",
        );
        match sifen_error(parse_batch_response(&body).unwrap_err()) {
            SifenError::Rejected { code, message } => {
                assert_eq!(code, "env:Receiver");
                assert_eq!(message, "Error interno");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        assert!(matches!(
            sifen_error(parse_batch_response("<html>oops").unwrap_err()),
            SifenError::Protocol(_)
        ));
    }

    #[test]
    fn test_batch_concluded_with_documents() {
        let body = soap(&format!(
            r#"<rResEnviConsLoteDe xmlns="{NS}"><dCodResLot>0362</dCodResLot><dMsgResLot>Procesamiento de lote concluido</dMsgResLot><gResProcLote><id>0180012345</id><dEstRes>Aprobado</dEstRes><gResProc><dCodRes>0260</dCodRes><dMsgRes>Autorización del DE satisfactoria</dMsgRes></gResProc></gResProcLote><gResProcLote><id>0180012346</id><dEstRes>Rechazado</dEstRes><gResProc><dCodRes>1000</dCodRes><dMsgRes>CDC no corresponde</dMsgRes></gResProc></gResProcLote></rResEnviConsLoteDe>"#
        ));
        let result = parse_batch_response(&body).unwrap();
        assert_eq!(result.outcome, BatchOutcome::Done);
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.documents[1].cdc, "0180012346");
        assert!(result.documents[1].is_rejected());
        assert_eq!(result.documents[0].code.as_deref(), Some("0260"));
    }

    #[test]
    fn test_batch_states() {
        for (wire, expected) in [
            ("0361", BatchOutcome::Processing),
            ("0360", BatchOutcome::ExpiredWindow),
            ("0364", BatchOutcome::RequiresCdc),
            ("0300", BatchOutcome::Queued),
        ] {
            let body = soap(&format!(
                r#"<rResEnviConsLoteDe xmlns="{NS}"><dCodResLot>{wire}</dCodResLot><dMsgResLot>m</dMsgResLot></rResEnviConsLoteDe>"#
            ));
            assert_eq!(parse_batch_response(&body).unwrap().outcome, expected, "{wire}");
        }
    }

    #[test]
    fn test_taxpayer_authorized() {
        let body = soap(&format!(
            r#"<rResEnviConsRUC xmlns="{NS}"><dCodRes>0502</dCodRes><dMsgRes>RUC encontrado</dMsgRes><xContRUC><dRUCCons>80012345</dRUCCons><dRazCons>EMPRESA SA</dRazCons><dCodEstCons>ACT</dCodEstCons><dDesEstCons>ACTIVO</dDesEstCons><dRUCFactElec>S</dRUCFactElec></xContRUC></rResEnviConsRUC>"#
        ));
        let status = parse_taxpayer_response(&body).unwrap();
        assert!(status.authorized);
        assert_eq!(status.name.as_deref(), Some("EMPRESA SA"));
        assert_eq!(status.registry_status.as_deref(), Some("ACTIVO"));
    }

    #[test]
    fn test_taxpayer_not_enabled() {
        let body = soap(&format!(
            r#"<rResEnviConsRUC xmlns="{NS}"><dCodRes>0502</dCodRes><dMsgRes>RUC encontrado</dMsgRes><xContRUC><dRUCFactElec>N</dRUCFactElec></xContRUC></rResEnviConsRUC>"#
        ));
        assert!(!parse_taxpayer_response(&body).unwrap().authorized);

        let body = soap(&format!(
            r#"<rResEnviConsRUC xmlns="{NS}"><dCodRes>0500</dCodRes><dMsgRes>RUC no existe</dMsgRes></rResEnviConsRUC>"#
        ));
        assert!(!parse_taxpayer_response(&body).unwrap().authorized);
    }

    #[test]
    fn test_taxpayer_no_permission_is_auth_error() {
        let body = soap(&format!(
            r#"<rResEnviConsRUC xmlns="{NS}"><dCodRes>0501</dCodRes><dMsgRes>Sin permiso</dMsgRes></rResEnviConsRUC>"#
        ));
        assert!(matches!(
            sifen_error(parse_taxpayer_response(&body).unwrap_err()),
            SifenError::AuthenticationFailed(_)
        ));
    }

    #[test]
    fn test_document_query() {
        let found = soap(&format!(
            r#"<rEnviConsDeResponse xmlns="{NS}"><dCodRes>0422</dCodRes><dMsgRes>CDC encontrado</dMsgRes></rEnviConsDeResponse>"#
        ));
        assert!(parse_document_response(&found).unwrap().found);

        let missing = soap(&format!(
            r#"<rEnviConsDeResponse xmlns="{NS}"><dCodRes>0420</dCodRes><dMsgRes>CDC inexistente</dMsgRes></rEnviConsDeResponse>"#
        ));
        assert!(!parse_document_response(&missing).unwrap().found);
    }
}
