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

// GetToken dispatch by token service type

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::errors::{BoxError, HubError};
use crate::core::models::MdmRequest;
use crate::mdm::{encode_response, GetToken};

/// Produces token data for one token service type.
#[async_trait]
pub trait GetTokenHandler: Send + Sync {
    async fn get_token(&self, r: &MdmRequest, m: &GetToken) -> Result<Vec<u8>, BoxError>;
}

#[derive(Serialize)]
struct GetTokenResponse {
    #[serde(rename = "TokenData")]
    token_data: plist::Data,
}

#[derive(Default)]
pub struct TokenMux {
    handlers: HashMap<String, Arc<dyn GetTokenHandler>>,
}

impl TokenMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `service_type`. Each service type takes one handler.
    pub fn handle(
        &mut self,
        service_type: impl Into<String>,
        handler: Arc<dyn GetTokenHandler>,
    ) -> Result<(), HubError> {
        let service_type = service_type.into();
        if service_type.is_empty() {
            return Err(HubError::ConfigurationError(
                "empty GetToken service type".to_string(),
            ));
        }
        if self.handlers.contains_key(&service_type) {
            return Err(HubError::ConfigurationError(format!(
                "GetToken service type already registered: {}",
                service_type
            )));
        }
        self.handlers.insert(service_type, handler);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Answer `m` with the `TokenData` plist from its service type's handler.
    pub async fn get_token(&self, r: &MdmRequest, m: &GetToken) -> Result<Vec<u8>, HubError> {
        let handler = self.handlers.get(&m.token_service_type).ok_or_else(|| {
            HubError::ValidationError(format!(
                "no GetToken handler for service type: {}",
                m.token_service_type
            ))
        })?;
        let data = handler
            .get_token(r, m)
            .await
            .map_err(|e| HubError::store("retrieving token data", e))?;
        encode_response(&GetTokenResponse {
            token_data: plist::Data::new(data),
        })
    }
}
