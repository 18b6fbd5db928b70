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

// Fan-out over a primary service and supplementary services

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{CheckinAndCommandService, CheckinService, CommandService};
use crate::core::errors::HubError;
use crate::core::models::MdmRequest;
use crate::mdm::{
    Authenticate, CheckOut, Command, CommandResults, DeclarativeManagement, GetBootstrapToken,
    GetToken, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

/// Calls the primary service, then every supplementary service in
/// registration order. Only the primary's result reaches the caller;
/// supplementary failures are logged.
pub struct MultiService {
    primary: Arc<dyn CheckinAndCommandService>,
    others: Vec<Arc<dyn CheckinAndCommandService>>,
}

impl MultiService {
    pub fn new(
        primary: Arc<dyn CheckinAndCommandService>,
        others: Vec<Arc<dyn CheckinAndCommandService>>,
    ) -> Self {
        Self { primary, others }
    }
}

fn log_supplementary<T>(op: &'static str, index: usize, r: &MdmRequest, result: Result<T, HubError>) {
    if let Err(e) = result {
        warn!(
            service = "multi",
            operation = op,
            index = index + 1,
            enrollment_id = %r.id,
            error = %e,
            "supplementary service failed"
        );
    }
}

#[async_trait]
impl CheckinService for MultiService {
    async fn authenticate(&self, r: &MdmRequest, m: &Authenticate) -> Result<(), HubError> {
        let result = self.primary.authenticate(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary("authenticate", i, r, svc.authenticate(r, m).await);
        }
        result
    }

    async fn token_update(&self, r: &MdmRequest, m: &TokenUpdate) -> Result<(), HubError> {
        let result = self.primary.token_update(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary("token_update", i, r, svc.token_update(r, m).await);
        }
        result
    }

    async fn check_out(&self, r: &MdmRequest, m: &CheckOut) -> Result<(), HubError> {
        let result = self.primary.check_out(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary("check_out", i, r, svc.check_out(r, m).await);
        }
        result
    }

    async fn declarative_management(
        &self,
        r: &MdmRequest,
        m: &DeclarativeManagement,
    ) -> Result<Option<Vec<u8>>, HubError> {
        let result = self.primary.declarative_management(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary(
                "declarative_management",
                i,
                r,
                svc.declarative_management(r, m).await,
            );
        }
        result
    }

    async fn user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, HubError> {
        let result = self.primary.user_authenticate(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary("user_authenticate", i, r, svc.user_authenticate(r, m).await);
        }
        result
    }

    async fn set_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &SetBootstrapToken,
    ) -> Result<(), HubError> {
        let result = self.primary.set_bootstrap_token(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary("set_bootstrap_token", i, r, svc.set_bootstrap_token(r, m).await);
        }
        result
    }

    async fn get_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &GetBootstrapToken,
    ) -> Result<Option<Vec<u8>>, HubError> {
        let result = self.primary.get_bootstrap_token(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary("get_bootstrap_token", i, r, svc.get_bootstrap_token(r, m).await);
        }
        result
    }

    async fn get_token(&self, r: &MdmRequest, m: &GetToken) -> Result<Option<Vec<u8>>, HubError> {
        let result = self.primary.get_token(r, m).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary("get_token", i, r, svc.get_token(r, m).await);
        }
        result
    }
}

#[async_trait]
impl CommandService for MultiService {
    async fn command_and_report_results(
        &self,
        r: &MdmRequest,
        results: &CommandResults,
    ) -> Result<Option<Command>, HubError> {
        let result = self.primary.command_and_report_results(r, results).await;
        for (i, svc) in self.others.iter().enumerate() {
            log_supplementary(
                "command_and_report_results",
                i,
                r,
                svc.command_and_report_results(r, results).await,
            );
        }
        result
    }
}
