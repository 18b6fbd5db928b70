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

//! Adapts check-ins and command reports into workflow engine events.
//!
//! First-enrollment detection relies on an external TokenUpdate tally: a
//! tally of exactly 1 marks the TokenUpdate as enrolling. The tally is not
//! read atomically with its increment, so concurrent TokenUpdates for one
//! enrollment may both, or neither, observe 1.

pub mod events;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::core::constants::message_types;
use crate::core::errors::{BoxError, EngineError, HubError};
use crate::core::models::{CallContext, MdmContext, MdmRequest};
use crate::mdm::{Authenticate, CheckOut, Command, CommandResults, TokenUpdate};
use crate::service::{CheckinService, CommandService};

pub use self::events::{
    AuthenticateCheckin, CheckOutCheckin, TokenUpdateCheckin, TokenUpdateEnrolling, WorkflowCheckin,
};

/// Event sink of the workflow engine.
#[async_trait]
pub trait MdmEventReceiver: Send + Sync {
    async fn mdm_checkin_event(
        &self,
        ctx: &CallContext,
        id: &str,
        checkin: &WorkflowCheckin,
        mdm_ctx: &MdmContext,
    ) -> Result<(), EngineError>;

    async fn mdm_command_response_event(
        &self,
        ctx: &CallContext,
        id: &str,
        command_uuid: Option<&str>,
        raw: &[u8],
        mdm_ctx: &MdmContext,
    ) -> Result<(), EngineError>;

    async fn mdm_idle_event(
        &self,
        ctx: &CallContext,
        id: &str,
        raw: &[u8],
        mdm_ctx: &MdmContext,
        event_at: DateTime<Utc>,
    ) -> Result<(), EngineError>;
}

/// Per-enrollment TokenUpdate counter.
#[async_trait]
pub trait TokenUpdateTallyStore: Send + Sync {
    async fn retrieve_token_update_tally(&self, ctx: &CallContext, id: &str) -> Result<u64, BoxError>;
}

pub struct CmdService {
    receiver: Arc<dyn MdmEventReceiver>,
    tally_store: Option<Arc<dyn TokenUpdateTallyStore>>,
    mask_already_started: bool,
}

impl CmdService {
    pub fn new(receiver: Arc<dyn MdmEventReceiver>) -> Self {
        Self {
            receiver,
            tally_store: None,
            mask_already_started: false,
        }
    }

    /// Mark first TokenUpdates as enrolling using this tally store.
    pub fn with_tally_store(mut self, tally_store: Arc<dyn TokenUpdateTallyStore>) -> Self {
        self.tally_store = Some(tally_store);
        self
    }

    /// Swallow (and log) "workflow already started" from idle events.
    pub fn with_mask_already_started(mut self, mask: bool) -> Self {
        self.mask_already_started = mask;
        self
    }

    async fn checkin(&self, r: &MdmRequest, message_type: &str, raw: &[u8]) -> Result<(), HubError> {
        let mut checkin = WorkflowCheckin::from_message_type(message_type, raw)?;

        let enrolling = match (&self.tally_store, &checkin) {
            (Some(tally_store), WorkflowCheckin::TokenUpdate(tu)) => {
                let tally = tally_store
                    .retrieve_token_update_tally(&r.ctx, &r.id)
                    .await
                    .map_err(|e| HubError::store("retrieving token update tally", e))?;
                if tally == 1 {
                    Some(TokenUpdateEnrolling::new(tu.clone())?)
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(enrolling) = enrolling {
            checkin = WorkflowCheckin::TokenUpdateEnrolling(enrolling);
        }

        self.receiver
            .mdm_checkin_event(&r.ctx, &r.id, &checkin, &r.mdm_context())
            .await
            .map_err(|e| HubError::engine("nanocmd check-in event", e))
    }
}

#[async_trait]
impl CheckinService for CmdService {
    async fn authenticate(&self, r: &MdmRequest, m: &Authenticate) -> Result<(), HubError> {
        self.checkin(r, message_types::AUTHENTICATE, &m.raw).await
    }

    async fn token_update(&self, r: &MdmRequest, m: &TokenUpdate) -> Result<(), HubError> {
        self.checkin(r, message_types::TOKEN_UPDATE, &m.raw).await
    }

    async fn check_out(&self, r: &MdmRequest, m: &CheckOut) -> Result<(), HubError> {
        self.checkin(r, message_types::CHECK_OUT, &m.raw).await
    }
}

#[async_trait]
impl CommandService for CmdService {
    async fn command_and_report_results(
        &self,
        r: &MdmRequest,
        results: &CommandResults,
    ) -> Result<Option<Command>, HubError> {
        let mdm_ctx = r.mdm_context();

        if results.is_idle() {
            let result = self
                .receiver
                .mdm_idle_event(&r.ctx, &r.id, &results.raw, &mdm_ctx, Utc::now())
                .await;
            match result {
                Err(EngineError::WorkflowAlreadyStarted) if self.mask_already_started => {
                    info!(
                        service = "cmdservice",
                        enrollment_id = %r.id,
                        error = %EngineError::WorkflowAlreadyStarted,
                        "idle event: masking workflow already started"
                    );
                }
                Err(e) => return Err(HubError::engine("nanocmd idle command response event", e)),
                Ok(()) => {}
            }
            return Ok(None);
        }

        self.receiver
            .mdm_command_response_event(
                &r.ctx,
                &r.id,
                results.command_uuid.as_deref(),
                &results.raw,
                &mdm_ctx,
            )
            .await
            .map_err(|e| HubError::engine("nanocmd command response event", e))?;
        Ok(None)
    }
}
