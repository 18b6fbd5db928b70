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

//! Request-scoped models shared by every layer of the hub.
//!
//! Nothing here performs I/O. A [`MdmRequest`] is built once per inbound
//! protocol call by the HTTP framing layer and passed by reference down the
//! service chain.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Opaque request parameters (URL query values) forwarded to the workflow engine.
pub type Params = BTreeMap<String, String>;

/// Cancellation and tracing scope of one inbound call.
///
/// Handed unchanged to every collaborator call so timeouts and cancellation
/// stay the collaborator's business.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancellation: CancellationToken,
    trace_id: Option<String>,
}

impl CallContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            trace_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Request context handed to the workflow engine alongside every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdmContext {
    pub params: Params,
}

impl MdmContext {
    pub fn new(params: Params) -> Self {
        Self { params }
    }
}

/// Identity hash of a client certificate - SHA-256 of the DER (64-character hex string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertHash(String);

impl CertHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DER-encoded client identity certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Deterministic: the same certificate always produces the same hash.
    pub fn hash(&self) -> CertHash {
        let mut hasher = Sha256::new();
        hasher.update(&self.der);
        CertHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("hash", &self.hash().as_str())
            .finish()
    }
}

/// One inbound MDM protocol call for a resolved enrollment.
#[derive(Debug, Clone)]
pub struct MdmRequest {
    pub ctx: CallContext,
    /// Resolved enrollment ID
    pub id: String,
    pub certificate: Option<Certificate>,
    pub params: Params,
}

impl MdmRequest {
    pub fn new(ctx: CallContext, id: impl Into<String>) -> Self {
        Self {
            ctx,
            id: id.into(),
            certificate: None,
            params: Params::new(),
        }
    }

    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Engine-facing context carrying this request's parameters.
    pub fn mdm_context(&self) -> MdmContext {
        MdmContext::new(self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cert_hash_deterministic() {
        let a = Certificate::from_der(b"certificate-bytes".to_vec());
        let b = Certificate::from_der(b"certificate-bytes".to_vec());

        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().as_str().len(), 64);
        assert!(a.hash().as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_mdm_context_carries_params() {
        let mut params = Params::new();
        params.insert("org".to_string(), "example".to_string());

        let req = MdmRequest::new(CallContext::default(), "UDID-1").with_params(params.clone());
        assert_eq!(req.mdm_context().params, params);
    }
}
