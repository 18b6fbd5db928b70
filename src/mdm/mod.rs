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

// MDM protocol message model

pub mod messages;

pub use messages::{
    decode_checkin, decode_command_results, encode_response, Authenticate, CheckOut, CheckinMessage, Command,
    CommandResults, DeclarativeManagement, Enrollment, GetBootstrapToken, GetToken,
    SetBootstrapToken, TokenUpdate, UserAuthenticate,
};
