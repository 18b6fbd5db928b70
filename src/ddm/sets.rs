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

// Removes DM set associations when a device (re-)enrolls

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::storage::EnrollmentSetRemover;
use crate::core::errors::HubError;
use crate::core::models::MdmRequest;
use crate::mdm::Authenticate;
use crate::service::{CheckinService, CommandService};

/// On `Authenticate`, removes every set association of the enrollment, or
/// only the named sets when any are configured.
pub struct SetsRemover {
    remover: Arc<dyn EnrollmentSetRemover>,
    sets: Vec<String>,
}

impl SetsRemover {
    pub fn new(remover: Arc<dyn EnrollmentSetRemover>, sets: Vec<String>) -> Self {
        Self { remover, sets }
    }
}

#[async_trait]
impl CheckinService for SetsRemover {
    async fn authenticate(&self, r: &MdmRequest, _m: &Authenticate) -> Result<(), HubError> {
        if self.sets.is_empty() {
            let changed = self
                .remover
                .remove_all_enrollment_sets(&r.ctx, &r.id)
                .await
                .map_err(|e| HubError::store("removing all enrollment sets", e))?;
            debug!(service = "sets_remover", enrollment_id = %r.id, changed, "removed all sets");
            return Ok(());
        }

        for set in &self.sets {
            let changed = self
                .remover
                .remove_enrollment_set(&r.ctx, &r.id, set)
                .await
                .map_err(|e| HubError::store("removing enrollment set", e))?;
            debug!(service = "sets_remover", enrollment_id = %r.id, set = %set, changed, "removed set");
        }
        Ok(())
    }
}

impl CommandService for SetsRemover {}
