// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Client certificate extraction middlewares.
//!
//! Each middleware places the extracted [`ClientCertificate`] into the request
//! extensions for the verification middleware and the MDM handlers.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::constants::mdm;
use crate::core::errors::BoxError;
use crate::core::models::Certificate;
use crate::http::responses::ApiError;

/// DER peer certificates of the TLS connection, leaf first. Inserted by the
/// TLS acceptor.
#[derive(Debug, Clone, Default)]
pub struct TlsPeerCertificates(pub Vec<Vec<u8>>);

/// The certificate identifying the enrollment on this request.
#[derive(Debug, Clone)]
pub struct ClientCertificate(pub Certificate);

/// Verifies a CMS detached `Mdm-Signature` over the request body and returns
/// the signing certificate.
pub trait MdmSignatureVerifier: Send + Sync {
    fn verify_mdm_signature(&self, header: &str, body: &[u8]) -> Result<Certificate, BoxError>;
}

/// Native mTLS extraction.
pub async fn cert_extract_tls(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let leaf = request
        .extensions()
        .get::<TlsPeerCertificates>()
        .and_then(|peers| peers.0.first().cloned());

    let Some(der) = leaf else {
        warn!(handler = "cert-extract", "missing TLS peer certificate");
        return Err(ApiError::bad_request("Missing client certificate"));
    };

    request
        .extensions_mut()
        .insert(ClientCertificate(Certificate::from_der(der)));
    Ok(next.run(request).await)
}

#[derive(Debug, Clone)]
pub struct CertHeaderState {
    pub header: String,
}

/// Certificate header extraction (reverse proxy terminating TLS).
pub async fn cert_extract_header(
    State(state): State<Arc<CertHeaderState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let cert = match parse_cert_header(request.headers(), &state.header) {
        Ok(cert) => cert,
        Err(e) => {
            warn!(handler = "cert-extract", header = %state.header, error = %e, "extracting certificate from header");
            return Err(ApiError::bad_request("Invalid client certificate header"));
        }
    };

    request.extensions_mut().insert(ClientCertificate(cert));
    Ok(next.run(request).await)
}

/// Decode an RFC 9440 (`:base64-der:`) or URL-encoded PEM certificate header.
pub fn parse_cert_header(headers: &HeaderMap, name: &str) -> Result<Certificate, BoxError> {
    let value = headers
        .get(name)
        .ok_or("missing certificate header")?
        .to_str()?
        .trim();
    if value.is_empty() {
        return Err("empty certificate header".into());
    }

    if let Some(inner) = value.strip_prefix(':') {
        let b64 = inner.strip_suffix(':').ok_or("unterminated RFC 9440 certificate")?;
        let der = STANDARD.decode(b64)?;
        return Ok(Certificate::from_der(der));
    }

    let decoded = percent_decode_str(value).decode_utf8()?;
    let block = pem::parse(decoded.as_bytes())?;
    if block.tag() != "CERTIFICATE" {
        return Err(format!("unexpected PEM block type: {}", block.tag()).into());
    }
    Ok(Certificate::from_der(block.contents().to_vec()))
}

#[derive(Clone)]
pub struct MdmSignatureState {
    pub verifier: Arc<dyn MdmSignatureVerifier>,
    pub log_errors: bool,
    pub body_limit: usize,
}

/// `Mdm-Signature` header extraction. Buffers the body to verify it and
/// hands the same bytes on to the handler.
pub async fn cert_extract_mdm_signature(
    State(state): State<Arc<MdmSignatureState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(header) = request
        .headers()
        .get(mdm::MDM_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        warn!(handler = "cert-extract", "missing Mdm-Signature header");
        return Err(ApiError::bad_request("Missing Mdm-Signature header"));
    };

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, state.body_limit).await.map_err(|e| {
        warn!(handler = "cert-extract", error = %e, "reading request body");
        ApiError::bad_request("Unreadable request body")
    })?;

    let cert = match state.verifier.verify_mdm_signature(&header, &bytes) {
        Ok(cert) => cert,
        Err(e) => {
            if state.log_errors {
                warn!(handler = "cert-extract", error = %e, mdm_signature = %header, "verifying Mdm-Signature");
            } else {
                warn!(handler = "cert-extract", error = %e, "verifying Mdm-Signature");
            }
            return Err(ApiError::bad_request("Invalid Mdm-Signature"));
        }
    };
    debug!(handler = "cert-extract", hash = %cert.hash(), "Mdm-Signature verified");

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(ClientCertificate(cert));
    Ok(next.run(request).await)
}
