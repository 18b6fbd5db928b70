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

pub mod mdm {
    /// Content type of check-in requests on a combined endpoint
    pub const CHECKIN_CONTENT_TYPE: &str = "application/x-apple-aspen-mdm-checkin";
    /// Header carrying the CMS detached signature of the request body
    pub const MDM_SIGNATURE_HEADER: &str = "Mdm-Signature";
    /// Command report status routed to the idle event path
    pub const STATUS_IDLE: &str = "Idle";
    /// Request type of the Declarative Management command
    pub const REQUEST_TYPE_DECLARATIVE_MANAGEMENT: &str = "DeclarativeManagement";
}

pub mod message_types {
    pub const AUTHENTICATE: &str = "Authenticate";
    pub const TOKEN_UPDATE: &str = "TokenUpdate";
    pub const CHECK_OUT: &str = "CheckOut";
    pub const DECLARATIVE_MANAGEMENT: &str = "DeclarativeManagement";
    pub const USER_AUTHENTICATE: &str = "UserAuthenticate";
    pub const SET_BOOTSTRAP_TOKEN: &str = "SetBootstrapToken";
    pub const GET_BOOTSTRAP_TOKEN: &str = "GetBootstrapToken";
    pub const GET_TOKEN: &str = "GetToken";
}

pub mod dm {
    pub const ENDPOINT_STATUS: &str = "status";
    pub const ENDPOINT_TOKENS: &str = "tokens";
    pub const ENDPOINT_DECLARATION_ITEMS: &str = "declaration-items";
    pub const DECLARATION_PREFIX: &str = "declaration/";

    pub const PATH_STATUS_ITEMS: &str = ".StatusItems";
    pub const PATH_ERRORS: &str = ".Errors";
    pub const PATH_DECLARATIONS: &str = ".StatusItems.management.declarations";
}

pub mod limits {
    /// Maximum MDM request body size (10 MB)
    pub const MAX_BODY_SIZE_BYTES: usize = 10 * 1024 * 1024;
    /// Maximum certificate chain depth walked by the pool verifier
    pub const MAX_CHAIN_DEPTH: usize = 8;
}

pub mod worker {
    /// Default polling interval of the engine worker, in seconds
    pub const DEFAULT_INTERVAL_SECS: u64 = 300;
}

pub mod config {
    pub const ENV_LOG_LEVEL: &str = "NANOHUB_LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "NANOHUB_LOG_FORMAT";
    pub const ENV_DEBUG: &str = "NANOHUB_DEBUG";
    pub const ENV_CA_PATH: &str = "NANOHUB_CA";
    pub const ENV_INTERMEDIATE_PATH: &str = "NANOHUB_INTERMEDIATE";
    pub const ENV_CERT_HEADER: &str = "NANOHUB_CERT_HEADER";
    pub const ENV_CHECKIN: &str = "NANOHUB_CHECKIN";
    pub const ENV_MIGRATION: &str = "NANOHUB_MIGRATION";
    pub const ENV_DUMP: &str = "NANOHUB_DUMP";
    pub const ENV_RETRO: &str = "NANOHUB_RETRO";
    pub const ENV_WORKER_INTERVAL: &str = "NANOHUB_WORKER_INTERVAL";
    pub const ENV_BODY_LIMIT: &str = "NANOHUB_BODY_LIMIT_BYTES";
}
