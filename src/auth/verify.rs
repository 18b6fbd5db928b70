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

//! Certificate validity verification.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

use super::extract::ClientCertificate;
use crate::core::constants::limits;
use crate::core::errors::{BoxError, HubError};
use crate::core::models::Certificate;
use crate::http::responses::ApiError;

/// Decides whether a client certificate is trusted.
pub trait CertVerifier: Send + Sync {
    fn verify(&self, cert: &Certificate) -> Result<(), BoxError>;
}

/// Rejects requests whose extracted certificate is missing or untrusted (401).
pub async fn cert_verify(
    State(verifier): State<Arc<dyn CertVerifier>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(ClientCertificate(cert)) = request.extensions().get::<ClientCertificate>() else {
        warn!(handler = "cert-verify", "missing client certificate");
        return Err(ApiError::unauthorized());
    };

    if let Err(e) = verifier.verify(cert) {
        warn!(handler = "cert-verify", hash = %cert.hash(), error = %e, "certificate verification failed");
        return Err(ApiError::unauthorized());
    }
    debug!(handler = "cert-verify", hash = %cert.hash(), "certificate verified");

    Ok(next.run(request).await)
}

/// Verifies client certificates against root and intermediate CA pools.
///
/// The leaf must be within its validity period and, when it carries an
/// extended key usage extension, be valid for client authentication. The
/// chain is walked by issuer name and signature up to a root.
#[derive(Debug, Clone)]
pub struct PoolVerifier {
    roots: Vec<Vec<u8>>,
    intermediates: Vec<Vec<u8>>,
}

impl PoolVerifier {
    pub fn from_pem(roots_pem: &[u8], intermediates_pem: &[u8]) -> Result<Self, HubError> {
        let roots = parse_pem_certificates(roots_pem)?;
        if roots.is_empty() {
            return Err(HubError::ConfigurationError(
                "no root certificates in PEM".to_string(),
            ));
        }
        let intermediates = parse_pem_certificates(intermediates_pem)?;
        Ok(Self {
            roots,
            intermediates,
        })
    }
}

fn parse_pem_certificates(data: &[u8]) -> Result<Vec<Vec<u8>>, HubError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let blocks = pem::parse_many(data)
        .map_err(|e| HubError::ConfigurationError(format!("parsing PEM: {}", e)))?;

    let mut ders = Vec::new();
    for block in blocks.into_iter().filter(|b| b.tag() == "CERTIFICATE") {
        X509Certificate::from_der(block.contents())
            .map_err(|e| HubError::ConfigurationError(format!("parsing certificate: {}", e)))?;
        ders.push(block.into_contents());
    }
    Ok(ders)
}

fn parse_pool(ders: &[Vec<u8>]) -> Result<Vec<X509Certificate<'_>>, BoxError> {
    ders.iter()
        .map(|der| {
            X509Certificate::from_der(der)
                .map(|(_, cert)| cert)
                .map_err(|e| -> BoxError { format!("parsing pool certificate: {}", e).into() })
        })
        .collect()
}

fn issued_by(child: &X509Certificate<'_>, parent: &X509Certificate<'_>) -> bool {
    child.issuer().as_raw() == parent.subject().as_raw()
        && child.verify_signature(Some(parent.public_key())).is_ok()
}

impl CertVerifier for PoolVerifier {
    fn verify(&self, cert: &Certificate) -> Result<(), BoxError> {
        let (_, leaf) = X509Certificate::from_der(cert.der())
            .map_err(|e| format!("parsing client certificate: {}", e))?;

        if !leaf.validity().is_valid() {
            return Err("certificate expired or not yet valid".into());
        }

        if let Some(eku) = leaf.extended_key_usage()? {
            if !eku.value.client_auth && !eku.value.any {
                return Err("certificate not valid for client authentication".into());
            }
        }

        let roots = parse_pool(&self.roots)?;
        let intermediates = parse_pool(&self.intermediates)?;

        let mut current = &leaf;
        for _ in 0..limits::MAX_CHAIN_DEPTH {
            if roots.iter().any(|root| issued_by(current, root)) {
                return Ok(());
            }

            match intermediates
                .iter()
                .find(|int| int.validity().is_valid() && issued_by(current, int))
            {
                Some(int) => current = int,
                None => return Err("certificate signed by unknown authority".into()),
            }
        }
        Err("certificate chain too long".into())
    }
}
