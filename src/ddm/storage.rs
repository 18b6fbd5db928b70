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

// Declarative Management storage collaborators

use async_trait::async_trait;

use super::status::StatusReport;
use crate::core::errors::BoxError;
use crate::core::models::CallContext;

/// Read access to the declarations assigned to an enrollment.
#[async_trait]
pub trait EnrollmentDeclarationStorage: Send + Sync {
    async fn retrieve_tokens_json(
        &self,
        ctx: &CallContext,
        enrollment_id: &str,
    ) -> Result<Vec<u8>, BoxError>;

    async fn retrieve_declaration_items_json(
        &self,
        ctx: &CallContext,
        enrollment_id: &str,
    ) -> Result<Vec<u8>, BoxError>;

    async fn retrieve_enrollment_declaration_json(
        &self,
        ctx: &CallContext,
        declaration_id: &str,
        declaration_type: &str,
        enrollment_id: &str,
    ) -> Result<Vec<u8>, BoxError>;
}

#[async_trait]
pub trait StatusStorer: Send + Sync {
    async fn store_declaration_status(
        &self,
        ctx: &CallContext,
        enrollment_id: &str,
        report: &StatusReport,
    ) -> Result<(), BoxError>;
}

/// Removal of enrollment-to-set associations. Returns whether anything changed.
#[async_trait]
pub trait EnrollmentSetRemover: Send + Sync {
    async fn remove_all_enrollment_sets(
        &self,
        ctx: &CallContext,
        enrollment_id: &str,
    ) -> Result<bool, BoxError>;

    async fn remove_enrollment_set(
        &self,
        ctx: &CallContext,
        enrollment_id: &str,
        set_name: &str,
    ) -> Result<bool, BoxError>;
}
