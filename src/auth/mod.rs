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

//! MDM request authentication.
//!
//! Layer order, outer to inner: one certificate extraction middleware, then
//! certificate verification, then the wrapped handler.

pub mod extract;
pub mod verify;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

use crate::core::errors::BoxError;
use crate::core::models::{CallContext, CertHash};
use crate::http::responses::ApiError;

pub use self::extract::{
    cert_extract_header, cert_extract_mdm_signature, cert_extract_tls, parse_cert_header,
    CertHeaderState, ClientCertificate, MdmSignatureState, MdmSignatureVerifier,
    TlsPeerCertificates,
};
pub use self::verify::{cert_verify, CertVerifier, PoolVerifier};

/// Where the client certificate comes from. Exactly one applies.
#[derive(Clone)]
pub enum CertExtraction {
    /// Native mTLS peer certificate
    Tls,
    /// Certificate forwarded by a TLS-terminating proxy in this header
    Header(String),
    /// Signing certificate of the `Mdm-Signature` header
    MdmSignature {
        verifier: Arc<dyn MdmSignatureVerifier>,
        log_errors: bool,
    },
}

impl std::fmt::Debug for CertExtraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertExtraction::Tls => write!(f, "Tls"),
            CertExtraction::Header(name) => f.debug_tuple("Header").field(name).finish(),
            CertExtraction::MdmSignature { log_errors, .. } => f
                .debug_struct("MdmSignature")
                .field("log_errors", log_errors)
                .finish(),
        }
    }
}

/// Configured MDM authentication, applied to routers with [`AuthMiddleware::wrap`].
#[derive(Clone)]
pub struct AuthMiddleware {
    extraction: CertExtraction,
    verifier: Arc<dyn CertVerifier>,
    body_limit: usize,
}

impl AuthMiddleware {
    pub fn new(extraction: CertExtraction, verifier: Arc<dyn CertVerifier>, body_limit: usize) -> Self {
        Self {
            extraction,
            verifier,
            body_limit,
        }
    }

    pub fn extraction(&self) -> &CertExtraction {
        &self.extraction
    }

    /// Wrap `router`: verification is applied first so extraction runs
    /// outside of it.
    pub fn wrap<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let router = router.layer(from_fn_with_state(self.verifier.clone(), cert_verify));

        match &self.extraction {
            CertExtraction::Tls => router.layer(from_fn(cert_extract_tls)),
            CertExtraction::Header(header) => router.layer(from_fn_with_state(
                Arc::new(CertHeaderState {
                    header: header.clone(),
                }),
                cert_extract_header,
            )),
            CertExtraction::MdmSignature {
                verifier,
                log_errors,
            } => router.layer(from_fn_with_state(
                Arc::new(MdmSignatureState {
                    verifier: verifier.clone(),
                    log_errors: *log_errors,
                    body_limit: self.body_limit,
                }),
                cert_extract_mdm_signature,
            )),
        }
    }
}

/// Looks up the enrollment associated with a certificate hash.
#[async_trait]
pub trait CertAuthRetriever: Send + Sync {
    async fn enrollment_id_for_cert_hash(
        &self,
        ctx: &CallContext,
        hash: &CertHash,
    ) -> Result<Option<String>, BoxError>;
}

/// Enrollment ID resolved from the client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentId(pub String);

/// Resolve the enrollment ID of the request's certificate and store it as an
/// [`EnrollmentId`] extension, alongside the request's [`CallContext`].
/// Requests without an associated enrollment are rejected.
pub async fn cert_with_enrollment_id(
    State(retriever): State<Arc<dyn CertAuthRetriever>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(ClientCertificate(cert)) = request.extensions().get::<ClientCertificate>() else {
        warn!(handler = "with-enrollment-id", "missing client certificate");
        return Err(ApiError::bad_request("Missing client certificate"));
    };
    let hash = cert.hash();

    let ctx = CallContext::new(CancellationToken::new()).with_trace_id(Uuid::new_v4().to_string());
    // cancel collaborator work if the client goes away
    let _guard = ctx.cancellation().clone().drop_guard();

    let id = retriever
        .enrollment_id_for_cert_hash(&ctx, &hash)
        .await
        .map_err(|e| {
            error!(handler = "with-enrollment-id", hash = %hash, error = %e, "retrieving enrollment ID");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?;

    match id.filter(|id| !id.is_empty()) {
        Some(id) => {
            request.extensions_mut().insert(EnrollmentId(id));
            request.extensions_mut().insert(ctx);
            Ok(next.run(request).await)
        }
        None => {
            warn!(handler = "with-enrollment-id", hash = %hash, "no enrollment for certificate");
            Err(ApiError::new(StatusCode::FORBIDDEN, "Forbidden"))
        }
    }
}
