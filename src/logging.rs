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

// Tracing subscriber initialisation

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::core::errors::HubError;

/// Initialize the global tracing subscriber from `settings`.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(settings: &Settings) -> Result<(), HubError> {
    let level = settings.effective_log_level();
    parse_log_level(level)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter);

    let result = if settings.log_format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    result.map_err(|e| HubError::ConfigurationError(format!("initializing tracing: {}", e)))
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<tracing::Level, HubError> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(tracing::Level::TRACE),
        "debug" => Ok(tracing::Level::DEBUG),
        "info" => Ok(tracing::Level::INFO),
        "warn" => Ok(tracing::Level::WARN),
        "error" => Ok(tracing::Level::ERROR),
        _ => Err(HubError::ConfigurationError(format!(
            "Invalid log level: {}",
            level
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), tracing::Level::DEBUG);
        assert!(parse_log_level("verbose").is_err());
    }
}
