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

//! Core MDM service: enrollment bookkeeping through an [`EnrollmentStore`] and
//! Declarative Management through the optional [`DmAdapter`].

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::token::TokenMux;
use super::ua::UserAuthenticateService;
use super::{CheckinService, CommandService};
use crate::core::errors::{BoxError, HubError};
use crate::core::models::MdmRequest;
use crate::ddm::DmAdapter;
use crate::mdm::{
    encode_response, Authenticate, CheckOut, Command, CommandResults, DeclarativeManagement,
    GetBootstrapToken, GetToken, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

/// Report status that defers the command; the queue skips it on the next fetch.
const STATUS_NOT_NOW: &str = "NotNow";

/// Enrollment and command queue storage owned by the embedding application.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn store_authenticate(&self, r: &MdmRequest, m: &Authenticate) -> Result<(), BoxError>;
    async fn store_token_update(&self, r: &MdmRequest, m: &TokenUpdate) -> Result<(), BoxError>;
    async fn clear_queue(&self, r: &MdmRequest) -> Result<(), BoxError>;
    async fn disable(&self, r: &MdmRequest) -> Result<(), BoxError>;
    async fn store_command_report(
        &self,
        r: &MdmRequest,
        results: &CommandResults,
    ) -> Result<(), BoxError>;
    async fn retrieve_next_command(
        &self,
        r: &MdmRequest,
        skip_not_now: bool,
    ) -> Result<Option<Command>, BoxError>;
    async fn store_user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<(), BoxError>;
    /// An empty token clears the stored one.
    async fn store_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &SetBootstrapToken,
    ) -> Result<(), BoxError>;
    async fn retrieve_bootstrap_token(&self, r: &MdmRequest) -> Result<Option<Vec<u8>>, BoxError>;
}

#[derive(Serialize)]
struct BootstrapTokenResponse {
    #[serde(rename = "BootstrapToken")]
    bootstrap_token: plist::Data,
}

pub struct CoreService {
    store: Arc<dyn EnrollmentStore>,
    dm: Option<Arc<DmAdapter>>,
    ua: Option<Arc<dyn UserAuthenticateService>>,
    tokens: Option<Arc<TokenMux>>,
}

impl CoreService {
    pub fn new(store: Arc<dyn EnrollmentStore>) -> Self {
        Self {
            store,
            dm: None,
            ua: None,
            tokens: None,
        }
    }

    pub fn with_declarative_management(mut self, dm: Arc<DmAdapter>) -> Self {
        self.dm = Some(dm);
        self
    }

    pub fn with_user_authenticate(mut self, ua: Arc<dyn UserAuthenticateService>) -> Self {
        self.ua = Some(ua);
        self
    }

    pub fn with_token_mux(mut self, tokens: Arc<TokenMux>) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

#[async_trait]
impl CheckinService for CoreService {
    async fn authenticate(&self, r: &MdmRequest, m: &Authenticate) -> Result<(), HubError> {
        self.store
            .store_authenticate(r, m)
            .await
            .map_err(|e| HubError::store("storing authenticate", e))?;
        // an enrollment is only enabled after its first TokenUpdate
        self.store
            .clear_queue(r)
            .await
            .map_err(|e| HubError::store("clearing command queue", e))?;
        self.store
            .disable(r)
            .await
            .map_err(|e| HubError::store("disabling enrollment", e))
    }

    async fn token_update(&self, r: &MdmRequest, m: &TokenUpdate) -> Result<(), HubError> {
        self.store
            .store_token_update(r, m)
            .await
            .map_err(|e| HubError::store("storing token update", e))
    }

    async fn check_out(&self, r: &MdmRequest, _m: &CheckOut) -> Result<(), HubError> {
        self.store
            .disable(r)
            .await
            .map_err(|e| HubError::store("disabling enrollment", e))
    }

    async fn declarative_management(
        &self,
        r: &MdmRequest,
        m: &DeclarativeManagement,
    ) -> Result<Option<Vec<u8>>, HubError> {
        match &self.dm {
            Some(dm) => dm.dispatch(Some(r), Some(m)).await,
            None => Err(HubError::ValidationError(
                "no Declarative Management handler".to_string(),
            )),
        }
    }

    async fn user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, HubError> {
        match &self.ua {
            Some(ua) => ua.user_authenticate(r, m).await,
            None => Err(HubError::Declined(
                "user channel not supported".to_string(),
            )),
        }
    }

    async fn set_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &SetBootstrapToken,
    ) -> Result<(), HubError> {
        self.store
            .store_bootstrap_token(r, m)
            .await
            .map_err(|e| HubError::store("storing bootstrap token", e))
    }

    async fn get_bootstrap_token(
        &self,
        r: &MdmRequest,
        _m: &GetBootstrapToken,
    ) -> Result<Option<Vec<u8>>, HubError> {
        let token = self
            .store
            .retrieve_bootstrap_token(r)
            .await
            .map_err(|e| HubError::store("retrieving bootstrap token", e))?;
        match token {
            Some(token) => encode_response(&BootstrapTokenResponse {
                bootstrap_token: plist::Data::new(token),
            })
            .map(Some),
            None => Ok(None),
        }
    }

    async fn get_token(&self, r: &MdmRequest, m: &GetToken) -> Result<Option<Vec<u8>>, HubError> {
        match &self.tokens {
            Some(tokens) => tokens.get_token(r, m).await.map(Some),
            None => Err(HubError::ValidationError(
                "no GetToken handlers".to_string(),
            )),
        }
    }
}

#[async_trait]
impl CommandService for CoreService {
    async fn command_and_report_results(
        &self,
        r: &MdmRequest,
        results: &CommandResults,
    ) -> Result<Option<Command>, HubError> {
        self.store
            .store_command_report(r, results)
            .await
            .map_err(|e| HubError::store("storing command report", e))?;

        let cmd = self
            .store
            .retrieve_next_command(r, results.status == STATUS_NOT_NOW)
            .await
            .map_err(|e| HubError::store("retrieving next command", e))?;
        if let Some(cmd) = &cmd {
            debug!(enrollment_id = %r.id, command_uuid = %cmd.command_uuid, "next command");
        }
        Ok(cmd)
    }
}
