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

//! MDM service capability traits and the wrappers composed into the service chain.
//!
//! A service implements [`CheckinService`] for check-in messages and
//! [`CommandService`] for command reports. Every method has a no-op default so
//! supplementary services only override what they react to.

pub mod certauth;
pub mod core;
pub mod dump;
pub mod multi;
pub mod token;
pub mod ua;

use async_trait::async_trait;

use crate::core::errors::HubError;
use crate::core::models::MdmRequest;
use crate::mdm::{
    Authenticate, CheckOut, CheckinMessage, Command, CommandResults, DeclarativeManagement,
    GetBootstrapToken, GetToken, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

pub use self::certauth::{CertAuth, CertAuthStore};
pub use self::core::{CoreService, EnrollmentStore};
pub use self::dump::{Dumper, DumpWriter, StdoutDump};
pub use self::multi::MultiService;
pub use self::token::{GetTokenHandler, TokenMux};
pub use self::ua::{DefaultUserAuthenticate, UserAuthenticateService};

/// Check-in message handling.
#[async_trait]
pub trait CheckinService: Send + Sync {
    async fn authenticate(&self, _r: &MdmRequest, _m: &Authenticate) -> Result<(), HubError> {
        Ok(())
    }

    async fn token_update(&self, _r: &MdmRequest, _m: &TokenUpdate) -> Result<(), HubError> {
        Ok(())
    }

    async fn check_out(&self, _r: &MdmRequest, _m: &CheckOut) -> Result<(), HubError> {
        Ok(())
    }

    /// Returns the response body for the DM endpoint, if any.
    async fn declarative_management(
        &self,
        _r: &MdmRequest,
        _m: &DeclarativeManagement,
    ) -> Result<Option<Vec<u8>>, HubError> {
        Ok(None)
    }

    /// Returns the response body, if any.
    async fn user_authenticate(
        &self,
        _r: &MdmRequest,
        _m: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, HubError> {
        Ok(None)
    }

    async fn set_bootstrap_token(
        &self,
        _r: &MdmRequest,
        _m: &SetBootstrapToken,
    ) -> Result<(), HubError> {
        Ok(())
    }

    async fn get_bootstrap_token(
        &self,
        _r: &MdmRequest,
        _m: &GetBootstrapToken,
    ) -> Result<Option<Vec<u8>>, HubError> {
        Ok(None)
    }

    async fn get_token(&self, _r: &MdmRequest, _m: &GetToken) -> Result<Option<Vec<u8>>, HubError> {
        Ok(None)
    }
}

/// Command report handling.
#[async_trait]
pub trait CommandService: Send + Sync {
    /// Returns the next command to send to the device, if any.
    async fn command_and_report_results(
        &self,
        _r: &MdmRequest,
        _results: &CommandResults,
    ) -> Result<Option<Command>, HubError> {
        Ok(None)
    }
}

/// A service handling both check-ins and command reports.
pub trait CheckinAndCommandService: CheckinService + CommandService {}

impl<T: CheckinService + CommandService + ?Sized> CheckinAndCommandService for T {}

/// Route a decoded check-in message to the matching [`CheckinService`] method.
pub async fn dispatch_checkin<S: CheckinService + ?Sized>(
    svc: &S,
    r: &MdmRequest,
    msg: &CheckinMessage,
) -> Result<Option<Vec<u8>>, HubError> {
    match msg {
        CheckinMessage::Authenticate(m) => svc.authenticate(r, m).await.map(|_| None),
        CheckinMessage::TokenUpdate(m) => svc.token_update(r, m).await.map(|_| None),
        CheckinMessage::CheckOut(m) => svc.check_out(r, m).await.map(|_| None),
        CheckinMessage::DeclarativeManagement(m) => svc.declarative_management(r, m).await,
        CheckinMessage::UserAuthenticate(m) => svc.user_authenticate(r, m).await,
        CheckinMessage::SetBootstrapToken(m) => svc.set_bootstrap_token(r, m).await.map(|_| None),
        CheckinMessage::GetBootstrapToken(m) => svc.get_bootstrap_token(r, m).await,
        CheckinMessage::GetToken(m) => svc.get_token(r, m).await,
    }
}
