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

//! Command enqueuing for enrollments.
//!
//! Wraps a raw enqueue-with-push collaborator. Used by DM change notification
//! to send `DeclarativeManagement` commands (or bare pushes) to the affected
//! enrollments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::core::constants::mdm;
use crate::core::errors::{BoxError, HubError};
use crate::core::models::CallContext;

/// Per-enrollment outcome of an enqueue/push call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_error: Option<String>,
}

/// Result of a raw enqueue-with-push call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResult {
    #[serde(default)]
    pub status: BTreeMap<String, EnrollmentResult>,
    #[serde(default)]
    pub no_push: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
}

impl ApiResult {
    /// Aggregate of every error in the result, or `None` if there are none.
    pub fn error(&self) -> Option<String> {
        let mut errs = Vec::new();
        if let Some(e) = &self.push_error {
            errs.push(format!("push error: {}", e));
        }
        if let Some(e) = &self.command_error {
            errs.push(format!("command error: {}", e));
        }
        for (id, result) in &self.status {
            if let Some(e) = &result.push_error {
                errs.push(format!("push error for {}: {}", id, e));
            }
            if let Some(e) = &result.command_error {
                errs.push(format!("command error for {}: {}", id, e));
            }
        }

        if errs.is_empty() {
            None
        } else {
            Some(errs.join("; "))
        }
    }
}

/// Enqueues raw commands and optionally sends APNs pushes.
#[async_trait]
pub trait RawCommandEnqueuer: Send + Sync {
    /// With `raw_command` absent only pushes are sent. Returns the result and
    /// an HTTP-like status code.
    async fn raw_command_enqueue_with_push(
        &self,
        ctx: &CallContext,
        raw_command: Option<&[u8]>,
        ids: &[String],
        no_push: bool,
    ) -> Result<(ApiResult, u16), BoxError>;
}

/// Generates unique command identifiers.
pub trait IdGenerator: Send + Sync {
    fn id(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn id(&self) -> String {
        Uuid::new_v4().to_string().to_uppercase()
    }
}

/// Upward-facing enqueuer used by DM change notification.
#[async_trait]
pub trait CommandEnqueuer: Send + Sync {
    async fn enqueue_dm_command(
        &self,
        ctx: &CallContext,
        ids: &[String],
        tokens_json: Option<&[u8]>,
    ) -> Result<(), HubError>;

    async fn push(&self, ctx: &CallContext, ids: &[String]) -> Result<(), HubError>;

    fn supports_multi_commands(&self) -> bool;
}

#[derive(Serialize)]
struct DmCommandPayload {
    #[serde(rename = "RequestType")]
    request_type: &'static str,
    #[serde(rename = "Data", skip_serializing_if = "Option::is_none")]
    data: Option<plist::Data>,
}

#[derive(Serialize)]
struct DmCommand {
    #[serde(rename = "Command")]
    command: DmCommandPayload,
    #[serde(rename = "CommandUUID")]
    command_uuid: String,
}

/// Build a plist `DeclarativeManagement` command, optionally carrying tokens JSON.
pub fn make_dm_command(command_uuid: &str, tokens_json: Option<&[u8]>) -> Result<Vec<u8>, HubError> {
    let cmd = DmCommand {
        command: DmCommandPayload {
            request_type: mdm::REQUEST_TYPE_DECLARATIVE_MANAGEMENT,
            data: tokens_json.map(|t| plist::Data::new(t.to_vec())),
        },
        command_uuid: command_uuid.to_string(),
    };

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &cmd)
        .map_err(|e| HubError::enqueue("making command", Box::new(e)))?;
    Ok(buf)
}

pub struct Enqueue {
    enqueuer: Arc<dyn RawCommandEnqueuer>,
    ids: Arc<dyn IdGenerator>,
    no_push: bool,
}

impl Enqueue {
    pub fn new(enqueuer: Arc<dyn RawCommandEnqueuer>) -> Self {
        Self {
            enqueuer,
            ids: Arc::new(UuidGenerator),
            no_push: false,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Suppress APNs pushes: commands are only enqueued.
    pub fn with_no_push(mut self, no_push: bool) -> Self {
        self.no_push = no_push;
        self
    }

    /// Enqueue `raw_command` to `ids` and push, unless pushes are suppressed.
    pub async fn enqueue(
        &self,
        ctx: &CallContext,
        ids: &[String],
        raw_command: Option<&[u8]>,
    ) -> Result<(), HubError> {
        let (result, status) = self
            .enqueuer
            .raw_command_enqueue_with_push(ctx, raw_command, ids, self.no_push)
            .await
            .map_err(|e| HubError::enqueue("raw push enqueue", e))?;
        debug!(service = "enqueue", ids = ids.len(), status, "raw push enqueue");

        match result.error() {
            Some(e) => Err(HubError::enqueue("enqueue result", e.into())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CommandEnqueuer for Enqueue {
    async fn enqueue_dm_command(
        &self,
        ctx: &CallContext,
        ids: &[String],
        tokens_json: Option<&[u8]>,
    ) -> Result<(), HubError> {
        let cmd = make_dm_command(&self.ids.id(), tokens_json)?;
        self.enqueue(ctx, ids, Some(&cmd)).await
    }

    async fn push(&self, ctx: &CallContext, ids: &[String]) -> Result<(), HubError> {
        if self.no_push {
            return Ok(());
        }
        self.enqueue(ctx, ids, None).await
    }

    fn supports_multi_commands(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_dm_command() {
        let cmd = make_dm_command("CMD-1", Some(br#"{"SyncTokens":{}}"#)).unwrap();
        let value: plist::Value = plist::from_bytes(&cmd).unwrap();
        let dict = value.as_dictionary().unwrap();

        assert_eq!(dict.get("CommandUUID").and_then(|v| v.as_string()), Some("CMD-1"));
        let inner = dict.get("Command").and_then(|v| v.as_dictionary()).unwrap();
        assert_eq!(
            inner.get("RequestType").and_then(|v| v.as_string()),
            Some("DeclarativeManagement")
        );
        assert_eq!(
            inner.get("Data").and_then(|v| v.as_data()),
            Some(&br#"{"SyncTokens":{}}"#[..])
        );
    }

    #[test]
    fn test_make_dm_command_without_tokens() {
        let cmd = make_dm_command("CMD-2", None).unwrap();
        let value: plist::Value = plist::from_bytes(&cmd).unwrap();
        let inner = value
            .as_dictionary()
            .and_then(|d| d.get("Command"))
            .and_then(|v| v.as_dictionary())
            .unwrap();
        assert!(inner.get("Data").is_none());
    }

    #[test]
    fn test_api_result_error_aggregates() {
        let mut result = ApiResult::default();
        assert!(result.error().is_none());

        result.status.insert(
            "UDID-1".to_string(),
            EnrollmentResult {
                push_error: Some("no push info".to_string()),
                ..Default::default()
            },
        );
        result.command_error = Some("queue full".to_string());

        let err = result.error().unwrap();
        assert!(err.contains("queue full"));
        assert!(err.contains("UDID-1"));
    }
}
