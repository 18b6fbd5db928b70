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

// Domain error types - collaborator failures are always wrapped with the operation that failed

use thiserror::Error;

/// Boxed error returned by external collaborators (storage, engines, verifiers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the hub
#[derive(Error, Debug)]
pub enum HubError {
    /// Mutually exclusive or incomplete options (build time only)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Malformed or unrecognized check-in/DM message (HTTP 400)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A required input was absent
    #[error("nil input: {0}")]
    NilInput(&'static str),

    /// Unrecognized Declarative Management endpoint tag (HTTP 400)
    #[error("unknown DM endpoint in check-in: {0}")]
    UnknownDmEndpoint(String),

    /// Malformed `declaration/{type}/{id}` suffix (HTTP 400)
    #[error("parsing declaration path: {path}: {reason}")]
    PathParseError { path: String, reason: String },

    /// A wrapper or message invariant did not hold (HTTP 400)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The check-in was understood and declined, e.g. an unsupported user channel (HTTP 410)
    #[error("Declined: {0}")]
    Declined(String),

    /// Certificate missing, unverifiable or not authorized (HTTP 401)
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// Storage collaborator failure (HTTP 500)
    #[error("{op}: {source}")]
    StoreError {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    /// Workflow engine failure (HTTP 500)
    #[error("{op}: {source}")]
    EngineError {
        op: &'static str,
        #[source]
        source: EngineError,
    },

    /// Command enqueue or push failure (HTTP 502)
    #[error("{op}: {source}")]
    EnqueueError {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    /// Background worker terminated abnormally
    #[error("Worker error: {0}")]
    WorkerError(String),
}

/// Errors reported by the command workflow engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Sentinel: a workflow for this enrollment is already running
    #[error("workflow already started")]
    WorkflowAlreadyStarted,

    #[error(transparent)]
    Other(#[from] BoxError),
}

impl HubError {
    /// Wrap a storage collaborator failure.
    pub fn store(op: &'static str, source: BoxError) -> Self {
        HubError::StoreError { op, source }
    }

    /// Wrap a workflow engine failure.
    pub fn engine(op: &'static str, source: EngineError) -> Self {
        HubError::EngineError { op, source }
    }

    /// Wrap an enqueue/push failure.
    pub fn enqueue(op: &'static str, source: BoxError) -> Self {
        HubError::EnqueueError { op, source }
    }

    /// True when this error carries the engine's "workflow already started" sentinel.
    pub fn is_workflow_already_started(&self) -> bool {
        matches!(
            self,
            HubError::EngineError {
                source: EngineError::WorkflowAlreadyStarted,
                ..
            }
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            HubError::ConfigurationError(_) => 500,
            HubError::ParseError(_) => 400,
            HubError::NilInput(_) => 400,
            HubError::UnknownDmEndpoint(_) => 400,
            HubError::PathParseError { .. } => 400,
            HubError::ValidationError(_) => 400,
            HubError::Declined(_) => 410,
            HubError::AuthenticationError(_) => 401,
            HubError::StoreError { .. } => 500,
            HubError::EngineError { .. } => 500,
            HubError::EnqueueError { .. } => 502,
            HubError::WorkerError(_) => 500,
        }
    }

    /// Get user-friendly error message (no collaborator internals)
    pub fn user_message(&self) -> String {
        match self {
            HubError::ParseError(_) => "Bad request".to_string(),
            HubError::NilInput(_) => "Bad request".to_string(),
            HubError::UnknownDmEndpoint(endpoint) => format!("Unknown DM endpoint: {}", endpoint),
            HubError::PathParseError { .. } => "Invalid declaration path".to_string(),
            HubError::ValidationError(_) => "Bad request".to_string(),
            HubError::Declined(_) => "Gone".to_string(),
            HubError::AuthenticationError(_) => "Unauthorized".to_string(),
            HubError::EnqueueError { .. } => "Service unavailable".to_string(),
            HubError::ConfigurationError(_)
            | HubError::StoreError { .. }
            | HubError::EngineError { .. }
            | HubError::WorkerError(_) => "Internal error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_keeps_operation_context() {
        let err = HubError::store("retrieving tokens", "connection refused".into());
        assert_eq!(err.to_string(), "retrieving tokens: connection refused");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_workflow_already_started_detection() {
        let err = HubError::engine("nanocmd idle event", EngineError::WorkflowAlreadyStarted);
        assert!(err.is_workflow_already_started());

        let other = HubError::engine("nanocmd idle event", EngineError::Other("boom".into()));
        assert!(!other.is_workflow_already_started());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(HubError::AuthenticationError("x".to_string()).status_code(), 401);
        assert_eq!(HubError::UnknownDmEndpoint("bogus".to_string()).status_code(), 400);
        assert_eq!(HubError::store("op", "x".into()).status_code(), 500);
        assert_eq!(HubError::enqueue("op", "x".into()).status_code(), 502);
        assert_eq!(HubError::Declined("user channel".to_string()).status_code(), 410);
    }

    #[test]
    fn test_user_messages_no_sensitive_data() {
        let err = HubError::store("storing status", "mysql://root:secret@db/nanohub".into());
        let user_msg = err.user_message();

        assert!(!user_msg.contains("secret"));
        assert_eq!(user_msg, "Internal error");
    }
}
