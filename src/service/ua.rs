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

//! UserAuthenticate handling for user channels.
//!
//! Without a configured service the core declines every user channel with
//! HTTP 410. [`DefaultUserAuthenticate`] can instead answer the first
//! message with a zero-length `DigestChallenge`, which lets the device
//! finish enrolling its user channel.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::EnrollmentStore;
use crate::core::errors::HubError;
use crate::core::models::MdmRequest;
use crate::mdm::{encode_response, UserAuthenticate};

#[async_trait]
pub trait UserAuthenticateService: Send + Sync {
    /// Returns the response body. [`HubError::Declined`] declines the user channel.
    async fn user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, HubError>;
}

#[derive(Serialize)]
struct DigestChallenge {
    #[serde(rename = "DigestChallenge")]
    digest_challenge: String,
}

pub struct DefaultUserAuthenticate {
    store: Arc<dyn EnrollmentStore>,
    zero_length_challenge: bool,
}

impl DefaultUserAuthenticate {
    pub fn new(store: Arc<dyn EnrollmentStore>, zero_length_challenge: bool) -> Self {
        Self {
            store,
            zero_length_challenge,
        }
    }
}

#[async_trait]
impl UserAuthenticateService for DefaultUserAuthenticate {
    async fn user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, HubError> {
        if self.zero_length_challenge {
            self.store
                .store_user_authenticate(r, m)
                .await
                .map_err(|e| HubError::store("storing user authenticate", e))?;
        }

        match (&m.digest_response, self.zero_length_challenge) {
            (None, true) => {
                debug!(enrollment_id = %r.id, "sending empty DigestChallenge");
                let body = encode_response(&DigestChallenge {
                    digest_challenge: String::new(),
                })?;
                Ok(Some(body))
            }
            (None, false) => {
                info!(enrollment_id = %r.id, "declining user channel");
                Err(HubError::Declined("user channel not supported".to_string()))
            }
            (Some(_), _) => {
                info!(enrollment_id = %r.id, "received DigestResponse");
                Ok(None)
            }
        }
    }
}
