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

// Raw protocol dump wrapper

use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;

use super::{CheckinAndCommandService, CheckinService, CommandService};
use crate::core::errors::HubError;
use crate::core::models::MdmRequest;
use crate::mdm::{
    Authenticate, CheckOut, Command, CommandResults, DeclarativeManagement, GetBootstrapToken,
    GetToken, SetBootstrapToken, TokenUpdate, UserAuthenticate,
};

/// Destination of dumped protocol bodies.
pub trait DumpWriter: Send + Sync {
    fn write_dump(&self, body: &[u8]) -> std::io::Result<()>;
}

/// Writes each body to stdout followed by a newline.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutDump;

impl DumpWriter for StdoutDump {
    fn write_dump(&self, body: &[u8]) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        out.write_all(body)?;
        out.write_all(b"\n")
    }
}

/// Dumps request bodies before calling `next`, and any body it returns after.
pub struct Dumper {
    next: Arc<dyn CheckinAndCommandService>,
    writer: Arc<dyn DumpWriter>,
}

impl Dumper {
    pub fn new(next: Arc<dyn CheckinAndCommandService>, writer: Arc<dyn DumpWriter>) -> Self {
        Self { next, writer }
    }

    fn dump(&self, body: &[u8]) {
        if let Err(e) = self.writer.write_dump(body) {
            warn!(service = "dump", error = %e, "writing dump");
        }
    }

    fn dump_response(&self, body: Option<&[u8]>) {
        if let Some(body) = body {
            self.dump(body);
        }
    }
}

#[async_trait]
impl CheckinService for Dumper {
    async fn authenticate(&self, r: &MdmRequest, m: &Authenticate) -> Result<(), HubError> {
        self.dump(&m.raw);
        self.next.authenticate(r, m).await
    }

    async fn token_update(&self, r: &MdmRequest, m: &TokenUpdate) -> Result<(), HubError> {
        self.dump(&m.raw);
        self.next.token_update(r, m).await
    }

    async fn check_out(&self, r: &MdmRequest, m: &CheckOut) -> Result<(), HubError> {
        self.dump(&m.raw);
        self.next.check_out(r, m).await
    }

    async fn declarative_management(
        &self,
        r: &MdmRequest,
        m: &DeclarativeManagement,
    ) -> Result<Option<Vec<u8>>, HubError> {
        self.dump(&m.raw);
        let body = self.next.declarative_management(r, m).await?;
        self.dump_response(body.as_deref());
        Ok(body)
    }

    async fn user_authenticate(
        &self,
        r: &MdmRequest,
        m: &UserAuthenticate,
    ) -> Result<Option<Vec<u8>>, HubError> {
        self.dump(&m.raw);
        let body = self.next.user_authenticate(r, m).await?;
        self.dump_response(body.as_deref());
        Ok(body)
    }

    async fn set_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &SetBootstrapToken,
    ) -> Result<(), HubError> {
        self.dump(&m.raw);
        self.next.set_bootstrap_token(r, m).await
    }

    async fn get_bootstrap_token(
        &self,
        r: &MdmRequest,
        m: &GetBootstrapToken,
    ) -> Result<Option<Vec<u8>>, HubError> {
        self.dump(&m.raw);
        let body = self.next.get_bootstrap_token(r, m).await?;
        self.dump_response(body.as_deref());
        Ok(body)
    }

    async fn get_token(&self, r: &MdmRequest, m: &GetToken) -> Result<Option<Vec<u8>>, HubError> {
        self.dump(&m.raw);
        let body = self.next.get_token(r, m).await?;
        self.dump_response(body.as_deref());
        Ok(body)
    }
}

#[async_trait]
impl CommandService for Dumper {
    async fn command_and_report_results(
        &self,
        r: &MdmRequest,
        results: &CommandResults,
    ) -> Result<Option<Command>, HubError> {
        self.dump(&results.raw);
        let cmd = self.next.command_and_report_results(r, results).await?;
        if let Some(cmd) = &cmd {
            self.dump(&cmd.raw);
        }
        Ok(cmd)
    }
}
