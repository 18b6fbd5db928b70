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

//! Typed MDM protocol messages decoded from plist request bodies.
//!
//! Every message keeps its raw bytes: downstream adapters re-parse them into
//! their own message types and must see exactly what the device sent.

use serde::{Deserialize, Serialize};

use crate::core::constants::{mdm, message_types};
use crate::core::errors::HubError;

/// Enrollment identity fields common to every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrollment {
    pub udid: Option<String>,
    pub user_id: Option<String>,
    pub enrollment_id: Option<String>,
    pub enrollment_user_id: Option<String>,
}

impl Enrollment {
    /// Resolve the enrollment ID: the device channel ID (`UDID`, else
    /// `EnrollmentID`), suffixed with `:<user>` for user channels.
    pub fn resolve_id(&self) -> Result<String, HubError> {
        let device = non_empty(&self.udid)
            .or_else(|| non_empty(&self.enrollment_id))
            .ok_or_else(|| HubError::ParseError("no device identifier in message".to_string()))?;

        match non_empty(&self.user_id).or_else(|| non_empty(&self.enrollment_user_id)) {
            Some(user) => Ok(format!("{}:{}", device, user)),
            None => Ok(device.to_string()),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticate {
    pub enrollment: Enrollment,
    pub topic: Option<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdate {
    pub enrollment: Enrollment,
    pub topic: Option<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOut {
    pub enrollment: Enrollment,
    pub topic: Option<String>,
    pub raw: Vec<u8>,
}

/// Declarative Management check-in: one protocol endpoint per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarativeManagement {
    pub enrollment: Enrollment,
    pub endpoint: String,
    /// Request payload (status report JSON for the `status` endpoint)
    pub data: Vec<u8>,
    pub raw: Vec<u8>,
}

/// User channel authentication. The first message of the exchange carries
/// no `DigestResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAuthenticate {
    pub enrollment: Enrollment,
    pub digest_response: Option<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetBootstrapToken {
    pub enrollment: Enrollment,
    /// Empty when the device clears its bootstrap token
    pub bootstrap_token: Vec<u8>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBootstrapToken {
    pub enrollment: Enrollment,
    pub raw: Vec<u8>,
}

/// Token request for a service type such as `com.apple.maid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetToken {
    pub enrollment: Enrollment,
    pub token_service_type: String,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinMessage {
    Authenticate(Authenticate),
    TokenUpdate(TokenUpdate),
    CheckOut(CheckOut),
    DeclarativeManagement(DeclarativeManagement),
    UserAuthenticate(UserAuthenticate),
    SetBootstrapToken(SetBootstrapToken),
    GetBootstrapToken(GetBootstrapToken),
    GetToken(GetToken),
}

impl CheckinMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            CheckinMessage::Authenticate(_) => message_types::AUTHENTICATE,
            CheckinMessage::TokenUpdate(_) => message_types::TOKEN_UPDATE,
            CheckinMessage::CheckOut(_) => message_types::CHECK_OUT,
            CheckinMessage::DeclarativeManagement(_) => message_types::DECLARATIVE_MANAGEMENT,
            CheckinMessage::UserAuthenticate(_) => message_types::USER_AUTHENTICATE,
            CheckinMessage::SetBootstrapToken(_) => message_types::SET_BOOTSTRAP_TOKEN,
            CheckinMessage::GetBootstrapToken(_) => message_types::GET_BOOTSTRAP_TOKEN,
            CheckinMessage::GetToken(_) => message_types::GET_TOKEN,
        }
    }

    pub fn enrollment(&self) -> &Enrollment {
        match self {
            CheckinMessage::Authenticate(m) => &m.enrollment,
            CheckinMessage::TokenUpdate(m) => &m.enrollment,
            CheckinMessage::CheckOut(m) => &m.enrollment,
            CheckinMessage::DeclarativeManagement(m) => &m.enrollment,
            CheckinMessage::UserAuthenticate(m) => &m.enrollment,
            CheckinMessage::SetBootstrapToken(m) => &m.enrollment,
            CheckinMessage::GetBootstrapToken(m) => &m.enrollment,
            CheckinMessage::GetToken(m) => &m.enrollment,
        }
    }

    pub fn raw(&self) -> &[u8] {
        match self {
            CheckinMessage::Authenticate(m) => &m.raw,
            CheckinMessage::TokenUpdate(m) => &m.raw,
            CheckinMessage::CheckOut(m) => &m.raw,
            CheckinMessage::DeclarativeManagement(m) => &m.raw,
            CheckinMessage::UserAuthenticate(m) => &m.raw,
            CheckinMessage::SetBootstrapToken(m) => &m.raw,
            CheckinMessage::GetBootstrapToken(m) => &m.raw,
            CheckinMessage::GetToken(m) => &m.raw,
        }
    }
}

/// Command report ("results") sent to the server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResults {
    pub enrollment: Enrollment,
    /// Absent for `Idle` reports
    pub command_uuid: Option<String>,
    pub status: String,
    pub raw: Vec<u8>,
}

impl CommandResults {
    pub fn is_idle(&self) -> bool {
        self.status == mdm::STATUS_IDLE
    }
}

/// A command returned to the device in response to a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command_uuid: String,
    pub raw: Vec<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(rename = "MessageType")]
    message_type: Option<String>,
    #[serde(rename = "UDID")]
    udid: Option<String>,
    #[serde(rename = "UserID")]
    user_id: Option<String>,
    #[serde(rename = "EnrollmentID")]
    enrollment_id: Option<String>,
    #[serde(rename = "EnrollmentUserID")]
    enrollment_user_id: Option<String>,
    #[serde(rename = "Topic")]
    topic: Option<String>,
    #[serde(rename = "Endpoint")]
    endpoint: Option<String>,
    #[serde(rename = "Data")]
    data: Option<plist::Data>,
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "CommandUUID")]
    command_uuid: Option<String>,
    #[serde(rename = "DigestResponse")]
    digest_response: Option<String>,
    #[serde(rename = "BootstrapToken")]
    bootstrap_token: Option<plist::Data>,
    #[serde(rename = "TokenServiceType")]
    token_service_type: Option<String>,
}

impl Envelope {
    fn decode(raw: &[u8]) -> Result<Self, HubError> {
        plist::from_bytes(raw).map_err(|e| HubError::ParseError(format!("decoding plist: {}", e)))
    }

    fn enrollment(&mut self) -> Enrollment {
        Enrollment {
            udid: self.udid.take(),
            user_id: self.user_id.take(),
            enrollment_id: self.enrollment_id.take(),
            enrollment_user_id: self.enrollment_user_id.take(),
        }
    }
}

/// Decode a check-in request body, dispatching on its `MessageType`.
pub fn decode_checkin(raw: &[u8]) -> Result<CheckinMessage, HubError> {
    let mut env = Envelope::decode(raw)?;
    let message_type = env
        .message_type
        .take()
        .ok_or_else(|| HubError::ParseError("missing MessageType".to_string()))?;
    let enrollment = env.enrollment();
    let raw = raw.to_vec();

    let msg = match message_type.as_str() {
        message_types::AUTHENTICATE => CheckinMessage::Authenticate(Authenticate {
            enrollment,
            topic: env.topic,
            raw,
        }),
        message_types::TOKEN_UPDATE => CheckinMessage::TokenUpdate(TokenUpdate {
            enrollment,
            topic: env.topic,
            raw,
        }),
        message_types::CHECK_OUT => CheckinMessage::CheckOut(CheckOut {
            enrollment,
            topic: env.topic,
            raw,
        }),
        message_types::DECLARATIVE_MANAGEMENT => {
            CheckinMessage::DeclarativeManagement(DeclarativeManagement {
                enrollment,
                endpoint: env.endpoint.unwrap_or_default(),
                data: env.data.map(Vec::from).unwrap_or_default(),
                raw,
            })
        }
        message_types::USER_AUTHENTICATE => CheckinMessage::UserAuthenticate(UserAuthenticate {
            enrollment,
            digest_response: env.digest_response.filter(|s| !s.is_empty()),
            raw,
        }),
        message_types::SET_BOOTSTRAP_TOKEN => {
            CheckinMessage::SetBootstrapToken(SetBootstrapToken {
                enrollment,
                bootstrap_token: env.bootstrap_token.map(Vec::from).unwrap_or_default(),
                raw,
            })
        }
        message_types::GET_BOOTSTRAP_TOKEN => {
            CheckinMessage::GetBootstrapToken(GetBootstrapToken { enrollment, raw })
        }
        message_types::GET_TOKEN => {
            let token_service_type = env
                .token_service_type
                .filter(|s| !s.is_empty())
                .ok_or_else(|| HubError::ParseError("missing TokenServiceType".to_string()))?;
            CheckinMessage::GetToken(GetToken {
                enrollment,
                token_service_type,
                raw,
            })
        }
        other => {
            return Err(HubError::ParseError(format!(
                "unsupported check-in message type: {}",
                other
            )))
        }
    };
    Ok(msg)
}

/// Encode a check-in response body as an XML plist.
pub fn encode_response<T: Serialize>(value: &T) -> Result<Vec<u8>, HubError> {
    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, value)
        .map_err(|e| HubError::ParseError(format!("encoding plist: {}", e)))?;
    Ok(buf)
}

/// Decode a command report body.
pub fn decode_command_results(raw: &[u8]) -> Result<CommandResults, HubError> {
    let mut env = Envelope::decode(raw)?;
    let status = env
        .status
        .take()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HubError::ParseError("missing command report Status".to_string()))?;

    Ok(CommandResults {
        enrollment: env.enrollment(),
        command_uuid: env.command_uuid.filter(|s| !s.is_empty()),
        status,
        raw: raw.to_vec(),
    })
}
