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

//! Declarative Management endpoint dispatch.
//!
//! The device names the DM endpoint it calls in the check-in `Endpoint` field:
//! `status`, `tokens`, `declaration-items` or `declaration/{type}/{id}`.

pub mod jsonpath;
pub mod sets;
pub mod status;
pub mod storage;

use std::sync::Arc;
use tracing::{debug, info};

use crate::core::constants::dm;
use crate::core::errors::{BoxError, HubError};
use crate::core::models::MdmRequest;
use crate::mdm::DeclarativeManagement;

pub use self::jsonpath::{PathHandler, PathMux};
pub use self::sets::SetsRemover;
pub use self::status::{
    register_status_handlers, DeclarationStatus, StatusError, StatusReport, StatusSession,
    StatusValue,
};
pub use self::storage::{EnrollmentDeclarationStorage, EnrollmentSetRemover, StatusStorer};

/// Assigns the ID of a parsed status report.
pub type StatusIdFn =
    Arc<dyn Fn(&MdmRequest, &StatusReport) -> Result<String, BoxError> + Send + Sync>;

/// Registers custom status handlers into every new status session.
pub type StatusHandlerHook = Arc<dyn Fn(&mut PathMux) + Send + Sync>;

/// Split a `{type}/{id}` declaration path.
pub fn parse_declaration_path(path: &str) -> Result<(String, String), HubError> {
    let err = |reason: &str| HubError::PathParseError {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let (decl_type, id) = path.split_once('/').ok_or_else(|| err("missing separator"))?;
    if decl_type.is_empty() {
        return Err(err("empty declaration type"));
    }
    if id.is_empty() {
        return Err(err("empty declaration identifier"));
    }
    Ok((decl_type.to_string(), id.to_string()))
}

pub struct DmAdapter {
    store: Arc<dyn EnrollmentDeclarationStorage>,
    status_store: Option<Arc<dyn StatusStorer>>,
    status_id_fn: Option<StatusIdFn>,
    status_handlers: Option<StatusHandlerHook>,
}

impl DmAdapter {
    pub fn new(store: Arc<dyn EnrollmentDeclarationStorage>) -> Self {
        Self {
            store,
            status_store: None,
            status_id_fn: None,
            status_handlers: None,
        }
    }

    /// Persist parsed status reports. Without a status store reports are
    /// parsed and discarded.
    pub fn with_status_store(mut self, status_store: Arc<dyn StatusStorer>) -> Self {
        self.status_store = Some(status_store);
        self
    }

    pub fn with_status_id_fn(mut self, f: StatusIdFn) -> Self {
        self.status_id_fn = Some(f);
        self
    }

    pub fn with_status_handlers(mut self, hook: StatusHandlerHook) -> Self {
        self.status_handlers = Some(hook);
        self
    }

    /// A fresh session with the custom handlers registered.
    pub fn new_status_session(&self) -> StatusSession {
        let mut session = StatusSession::new();
        if let Some(hook) = &self.status_handlers {
            hook(&mut session.mux);
        }
        session
    }

    /// Dispatch one DM endpoint call. Returns the response body, if the
    /// endpoint has one.
    pub async fn dispatch(
        &self,
        r: Option<&MdmRequest>,
        m: Option<&DeclarativeManagement>,
    ) -> Result<Option<Vec<u8>>, HubError> {
        let r = r.ok_or(HubError::NilInput("request"))?;
        let m = m.ok_or(HubError::NilInput("declarative management message"))?;

        match m.endpoint.as_str() {
            dm::ENDPOINT_STATUS => {
                let mut session = self.new_status_session();
                self.status(r, &m.data, &mut session).await?;
                Ok(None)
            }
            dm::ENDPOINT_TOKENS => self
                .store
                .retrieve_tokens_json(&r.ctx, &r.id)
                .await
                .map(Some)
                .map_err(|e| HubError::store("retrieving tokens", e)),
            dm::ENDPOINT_DECLARATION_ITEMS => self
                .store
                .retrieve_declaration_items_json(&r.ctx, &r.id)
                .await
                .map(Some)
                .map_err(|e| HubError::store("retrieving declaration items", e)),
            endpoint => match endpoint.strip_prefix(dm::DECLARATION_PREFIX) {
                Some(path) => {
                    let (decl_type, id) = parse_declaration_path(path)?;
                    self.store
                        .retrieve_enrollment_declaration_json(&r.ctx, &id, &decl_type, &r.id)
                        .await
                        .map(Some)
                        .map_err(|e| HubError::store("retrieving declaration", e))
                }
                None => Err(HubError::UnknownDmEndpoint(endpoint.to_string())),
            },
        }
    }

    /// Parse a status submission through `session` and store the report.
    pub async fn status(
        &self,
        r: &MdmRequest,
        data: &[u8],
        session: &mut StatusSession,
    ) -> Result<(), HubError> {
        session.parse(data)?;

        for path in &session.unhandled {
            debug!(service = "ddm", enrollment_id = %r.id, path = %path, "unhandled status path");
        }

        if let Some(id_fn) = &self.status_id_fn {
            match id_fn(r, &session.report) {
                Ok(id) => session.report.id = Some(id),
                Err(e) => {
                    info!(service = "ddm", enrollment_id = %r.id, error = %e, "generating status ID");
                }
            }
        }

        let Some(status_store) = &self.status_store else {
            return Ok(());
        };

        status_store
            .store_declaration_status(&r.ctx, &r.id, &session.report)
            .await
            .map_err(|e| HubError::store("storing status", e))
    }
}
