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

//! Certificate-to-enrollment authorization.
//!
//! `Authenticate` associates the client certificate hash with the enrollment.
//! Every later message must arrive with an associated certificate. With
//! retroactive association enabled, enrollments that predate this wrapper get
//! associated on first contact, but an existing association is never replaced.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{CheckinAndCommandService, CheckinService, CommandService};
use crate::core::errors::{BoxError, HubError};
use crate::core::models::{CertHash, MdmRequest};
use crate::mdm::{
    Authenticate, CheckOut, Command, CommandResults, DeclarativeManagement, GetBootstrapToken,
    GetToken, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

/// Storage of certificate hash associations.
#[async_trait]
pub trait CertAuthStore: Send + Sync {
    /// Is this hash associated with any enrollment?
    async fn has_cert_hash(&self, r: &MdmRequest, hash: &CertHash) -> Result<bool, BoxError>;

    /// Does the request's enrollment have any hash associated?
    async fn enrollment_has_cert_hash(&self, r: &MdmRequest) -> Result<bool, BoxError>;

    /// Is this hash associated with the request's enrollment?
    async fn is_cert_hash_associated(
        &self,
        r: &MdmRequest,
        hash: &CertHash,
    ) -> Result<bool, BoxError>;

    async fn associate_cert_hash(&self, r: &MdmRequest, hash: &CertHash) -> Result<(), BoxError>;
}

/// Service wrapper enforcing certificate associations before calling `next`.
pub struct CertAuth {
    next: Arc<dyn CheckinAndCommandService>,
    store: Arc<dyn CertAuthStore>,
    retroactive: bool,
}

impl CertAuth {
    pub fn new(next: Arc<dyn CheckinAndCommandService>, store: Arc<dyn CertAuthStore>) -> Self {
        Self {
            next,
            store,
            retroactive: false,
        }
    }

    /// Allow associating certificates for enrollments that have none yet.
    pub fn with_retroactive(mut self, retroactive: bool) -> Self {
        self.retroactive = retroactive;
        self
    }

    fn cert_hash(r: &MdmRequest) -> Result<CertHash, HubError> {
        if r.id.is_empty() {
            return Err(HubError::AuthenticationError("empty enrollment ID".to_string()));
        }
        r.certificate
            .as_ref()
            .map(|c| c.hash())
            .ok_or_else(|| HubError::AuthenticationError("missing certificate".to_string()))
    }

    async fn associate_new_enrollment(&self, r: &MdmRequest) -> Result<(), HubError> {
        let hash = Self::cert_hash(r)?;

        let has_hash = self
            .store
            .has_cert_hash(r, &hash)
            .await
            .map_err(|e| HubError::store("cert auth: checking cert hash", e))?;
        if has_hash {
            let associated = self
                .store
                .is_cert_hash_associated(r, &hash)
                .await
                .map_err(|e| HubError::store("cert auth: checking cert association", e))?;
            if !associated {
                info!(enrollment_id = %r.id, hash = %hash, "cert hash exists for another enrollment");
                return Err(HubError::AuthenticationError(
                    "cert auth: cert hash already in use".to_string(),
                ));
            }
        }

        self.store
            .associate_cert_hash(r, &hash)
            .await
            .map_err(|e| HubError::store("cert auth: associating cert hash", e))?;
        info!(enrollment_id = %r.id, hash = %hash, "cert associated");
        Ok(())
    }

    async fn validate_existing_enrollment(&self, r: &MdmRequest) -> Result<(), HubError> {
        let hash = Self::cert_hash(r)?;

        let associated = self
            .store
            .is_cert_hash_associated(r, &hash)
            .await
            .map_err(|e| HubError::store("cert auth: checking cert association", e))?;
        if associated {
            return Ok(());
        }

        if !self.retroactive {
            info!(enrollment_id = %r.id, hash = %hash, "no cert association");
            return Err(HubError::AuthenticationError(
                "cert auth: no cert association".to_string(),
            ));
        }

        // never replace an association that already exists
        let enrollment_has_hash = self
            .store
            .enrollment_has_cert_hash(r)
            .await
            .map_err(|e| HubError::store("cert auth: checking enrollment cert hash", e))?;
        if enrollment_has_hash {
            info!(enrollment_id = %r.id, hash = %hash, "enrollment already has a different cert associated");
            return Err(HubError::AuthenticationError(
                "cert auth: no cert association".to_string(),
            ));
        }

        let has_hash = self
            .store
            .has_cert_hash(r, &hash)
            .await
            .map_err(|e| HubError::store("cert auth: checking cert hash", e))?;
        if has_hash {
            info!(enrollment_id = %r.id, hash = %hash, "cert hash exists for another enrollment");
            return Err(HubError::AuthenticationError(
                "cert auth: cert hash already in use".to_string(),
            ));
        }

        self.store
            .associate_cert_hash(r, &hash)
            .await
            .map_err(|e| HubError::store("cert auth: associating cert hash", e))?;
        info!(enrollment_id = %r.id, hash = %hash, "cert associated retroactively");
        Ok(())
    }
}

#[async_trait]
impl CheckinService for CertAuth {
    async fn authenticate(&self, r: &MdmRequest, m: &Authenticate) -> Result<(), HubError> {
        self.associate_new_enrollment(r).await?;
        self.next.authenticate(r, m).await
    }

    async fn token_update(&self, r: &MdmRequest, m: &TokenUpdate) -> Result<(), HubError> {
        self.validate_existing_enrollment(r).await?;
        self.next.token_update(r, m).await
    }

    async fn check_out(&self, r: &MdmRequest, m: &CheckOut) -> Result<(), HubError> {
        self.validate_existing_enrollment(r).await?;
        self.next.check_out(r, m).await
    }

    async fn declarative_management(
        &self,
        r: &MdmRequest,
        m: &DeclarativeManagement,
    ) -> Result<Option<Vec<u8>>, HubError> {
        self.validate_existing_enrollment(r).await?;
        self.next.declarative_management(r, m).await
    }

    async fn user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, HubError> {
        self.validate_existing_enrollment(r).await?;
        self.next.user_authenticate(r, m).await
    }

    async fn set_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &SetBootstrapToken,
    ) -> Result<(), HubError> {
        self.validate_existing_enrollment(r).await?;
        self.next.set_bootstrap_token(r, m).await
    }

    async fn get_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &GetBootstrapToken,
    ) -> Result<Option<Vec<u8>>, HubError> {
        self.validate_existing_enrollment(r).await?;
        self.next.get_bootstrap_token(r, m).await
    }

    async fn get_token(&self, r: &MdmRequest, m: &GetToken) -> Result<Option<Vec<u8>>, HubError> {
        self.validate_existing_enrollment(r).await?;
        self.next.get_token(r, m).await
    }
}

#[async_trait]
impl CommandService for CertAuth {
    async fn command_and_report_results(
        &self,
        r: &MdmRequest,
        results: &CommandResults,
    ) -> Result<Option<Command>, HubError> {
        self.validate_existing_enrollment(r).await?;
        debug!(enrollment_id = %r.id, "cert association valid");
        self.next.command_and_report_results(r, results).await
    }
}
