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

//! Check-in messages as seen by the workflow engine.
//!
//! The engine parses raw check-in bytes on its own terms, independent of the
//! protocol-side decoding in [`crate::mdm`].

use serde::Deserialize;

use crate::core::constants::message_types;
use crate::core::errors::HubError;
use crate::mdm::Enrollment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateCheckin {
    pub enrollment: Enrollment,
    pub topic: Option<String>,
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub build_version: Option<String>,
    pub device_name: Option<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdateCheckin {
    pub enrollment: Enrollment,
    pub topic: Option<String>,
    pub push_magic: Option<String>,
    pub token: Vec<u8>,
    pub awaiting_configuration: bool,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutCheckin {
    pub enrollment: Enrollment,
    pub topic: Option<String>,
    pub raw: Vec<u8>,
}

/// A TokenUpdate observed as the enrollment's first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdateEnrolling {
    pub token_update: TokenUpdateCheckin,
    pub enrolling: bool,
}

impl TokenUpdateEnrolling {
    pub fn new(token_update: TokenUpdateCheckin) -> Result<Self, HubError> {
        let enrolling = Self {
            token_update,
            enrolling: true,
        };
        enrolling.validate()?;
        Ok(enrolling)
    }

    pub fn validate(&self) -> Result<(), HubError> {
        self.token_update
            .enrollment
            .resolve_id()
            .map(|_| ())
            .map_err(|_| {
                HubError::ValidationError("token update enrolling: missing enrollment identity".to_string())
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowCheckin {
    Authenticate(AuthenticateCheckin),
    TokenUpdate(TokenUpdateCheckin),
    TokenUpdateEnrolling(TokenUpdateEnrolling),
    CheckOut(CheckOutCheckin),
}

#[derive(Deserialize)]
struct Wire {
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
    #[serde(rename = "SerialNumber")]
    serial_number: Option<String>,
    #[serde(rename = "Model")]
    model: Option<String>,
    #[serde(rename = "OSVersion")]
    os_version: Option<String>,
    #[serde(rename = "BuildVersion")]
    build_version: Option<String>,
    #[serde(rename = "DeviceName")]
    device_name: Option<String>,
    #[serde(rename = "PushMagic")]
    push_magic: Option<String>,
    #[serde(rename = "Token")]
    token: Option<plist::Data>,
    #[serde(rename = "AwaitingConfiguration")]
    awaiting_configuration: Option<bool>,
}

impl WorkflowCheckin {
    /// Parse `raw` as the check-in named by `message_type`.
    pub fn from_message_type(message_type: &str, raw: &[u8]) -> Result<Self, HubError> {
        let wire: Wire = plist::from_bytes(raw)
            .map_err(|e| HubError::ParseError(format!("decoding {} check-in: {}", message_type, e)))?;

        if let Some(declared) = wire.message_type.as_deref() {
            if declared != message_type {
                return Err(HubError::ParseError(format!(
                    "message type mismatch: expected {}, got {}",
                    message_type, declared
                )));
            }
        }

        let enrollment = Enrollment {
            udid: wire.udid,
            user_id: wire.user_id,
            enrollment_id: wire.enrollment_id,
            enrollment_user_id: wire.enrollment_user_id,
        };
        let raw = raw.to_vec();

        match message_type {
            message_types::AUTHENTICATE => Ok(WorkflowCheckin::Authenticate(AuthenticateCheckin {
                enrollment,
                topic: wire.topic,
                serial_number: wire.serial_number,
                model: wire.model,
                os_version: wire.os_version,
                build_version: wire.build_version,
                device_name: wire.device_name,
                raw,
            })),
            message_types::TOKEN_UPDATE => Ok(WorkflowCheckin::TokenUpdate(TokenUpdateCheckin {
                enrollment,
                topic: wire.topic,
                push_magic: wire.push_magic,
                token: wire.token.map(Vec::from).unwrap_or_default(),
                awaiting_configuration: wire.awaiting_configuration.unwrap_or(false),
                raw,
            })),
            message_types::CHECK_OUT => Ok(WorkflowCheckin::CheckOut(CheckOutCheckin {
                enrollment,
                topic: wire.topic,
                raw,
            })),
            other => Err(HubError::ParseError(format!(
                "unknown check-in message type: {}",
                other
            ))),
        }
    }

    pub fn is_enrolling(&self) -> bool {
        matches!(self, WorkflowCheckin::TokenUpdateEnrolling(t) if t.enrolling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_UPDATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>AwaitingConfiguration</key>
    <true/>
    <key>MessageType</key>
    <string>TokenUpdate</string>
    <key>PushMagic</key>
    <string>magic</string>
    <key>Token</key>
    <data>dG9rZW4=</data>
    <key>Topic</key>
    <string>com.apple.mgmt.test</string>
    <key>UDID</key>
    <string>UDID-1</string>
</dict>
</plist>"#;

    #[test]
    fn test_parse_token_update() {
        let checkin = WorkflowCheckin::from_message_type("TokenUpdate", TOKEN_UPDATE.as_bytes()).unwrap();
        match checkin {
            WorkflowCheckin::TokenUpdate(tu) => {
                assert_eq!(tu.token, b"token");
                assert!(tu.awaiting_configuration);
                assert_eq!(tu.push_magic.as_deref(), Some("magic"));
            }
            other => panic!("unexpected check-in: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_type() {
        let err = WorkflowCheckin::from_message_type("Bogus", TOKEN_UPDATE.as_bytes()).unwrap_err();
        assert!(matches!(err, HubError::ParseError(_)));
    }

    #[test]
    fn test_enrolling_requires_identity() {
        let tu = TokenUpdateCheckin {
            enrollment: Enrollment::default(),
            topic: None,
            push_magic: None,
            token: vec![],
            awaiting_configuration: false,
            raw: vec![],
        };
        assert!(matches!(
            TokenUpdateEnrolling::new(tu),
            Err(HubError::ValidationError(_))
        ));
    }
}
