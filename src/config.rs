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

// Configuration management

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::constants::{config as keys, limits, worker};
use crate::core::errors::HubError;
use crate::hub::HubBuilder;

/// Process settings loaded from `NANOHUB_*` environment variables.
///
/// Settings cover what an operator chooses at deploy time. Collaborators
/// (storage, engine, verifiers) are supplied in code through [`HubBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub debug: bool,

    // Trust
    pub ca_path: Option<PathBuf>,
    pub intermediate_path: Option<PathBuf>,
    pub cert_header: Option<String>,

    // Surfaces
    pub checkin: bool,
    pub migration: bool,
    pub dump: bool,
    pub retro: bool,

    pub worker_interval_secs: u64,
    pub body_limit_bytes: usize,
}

impl Settings {
    /// Load settings from the environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, HubError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // file may not exist
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HubError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let settings = Self {
            log_level: get(keys::ENV_LOG_LEVEL).unwrap_or_else(|| "info".to_string()),
            log_format: get(keys::ENV_LOG_FORMAT).unwrap_or_else(|| "text".to_string()),
            debug: parse_bool(keys::ENV_DEBUG, get(keys::ENV_DEBUG))?,
            ca_path: get(keys::ENV_CA_PATH).map(PathBuf::from),
            intermediate_path: get(keys::ENV_INTERMEDIATE_PATH).map(PathBuf::from),
            cert_header: get(keys::ENV_CERT_HEADER),
            checkin: parse_bool(keys::ENV_CHECKIN, get(keys::ENV_CHECKIN))?,
            migration: parse_bool(keys::ENV_MIGRATION, get(keys::ENV_MIGRATION))?,
            dump: parse_bool(keys::ENV_DUMP, get(keys::ENV_DUMP))?,
            retro: parse_bool(keys::ENV_RETRO, get(keys::ENV_RETRO))?,
            worker_interval_secs: parse_positive(
                keys::ENV_WORKER_INTERVAL,
                get(keys::ENV_WORKER_INTERVAL),
                worker::DEFAULT_INTERVAL_SECS,
            )?,
            body_limit_bytes: parse_positive(
                keys::ENV_BODY_LIMIT,
                get(keys::ENV_BODY_LIMIT),
                limits::MAX_BODY_SIZE_BYTES as u64,
            )? as usize,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), HubError> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(HubError::ConfigurationError(format!(
                    "Invalid {} value '{}': expected json or text",
                    keys::ENV_LOG_FORMAT,
                    other
                )))
            }
        }

        if self.intermediate_path.is_some() && self.ca_path.is_none() {
            return Err(HubError::ConfigurationError(format!(
                "{} requires {}",
                keys::ENV_INTERMEDIATE_PATH,
                keys::ENV_CA_PATH
            )));
        }
        Ok(())
    }

    /// Effective log filter: `debug` overrides the configured level.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Apply these settings to `builder`, reading the CA files.
    pub fn apply(&self, mut builder: HubBuilder) -> Result<HubBuilder, HubError> {
        if let Some(path) = &self.ca_path {
            builder = builder.with_root_pems(read_file(keys::ENV_CA_PATH, path)?);
        }
        if let Some(path) = &self.intermediate_path {
            builder = builder.with_intermediate_pems(read_file(keys::ENV_INTERMEDIATE_PATH, path)?);
        }
        if let Some(header) = &self.cert_header {
            builder = builder.with_cert_header(header.clone());
        }
        if self.checkin {
            builder = builder.with_checkin_handler();
        }
        if self.migration {
            builder = builder.with_migration();
        }
        if self.dump {
            builder = builder.with_dump_to_stdout();
        }
        if self.retro {
            builder = builder.with_allow_retroactive();
        }

        Ok(builder
            .with_worker_interval(Duration::from_secs(self.worker_interval_secs))
            .with_body_limit(self.body_limit_bytes))
    }
}

fn read_file(key: &str, path: &PathBuf) -> Result<Vec<u8>, HubError> {
    fs::read(path).map_err(|e| {
        HubError::ConfigurationError(format!("reading {} file {}: {}", key, path.display(), e))
    })
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool, HubError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HubError::ConfigurationError(format!(
            "Invalid {} value '{}': expected a boolean",
            key, value
        ))),
    }
}

fn parse_positive(key: &str, value: Option<String>, default: u64) -> Result<u64, HubError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed = value.parse::<u64>().map_err(|e| {
        HubError::ConfigurationError(format!("Invalid {} value '{}': {}", key, value, e))
    })?;
    if parsed == 0 {
        return Err(HubError::ConfigurationError(format!(
            "{} must be greater than 0",
            key
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, HubError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.log_level, "info");
        assert_eq!(s.log_format, "text");
        assert!(!s.checkin && !s.migration && !s.dump && !s.retro);
        assert_eq!(s.worker_interval_secs, worker::DEFAULT_INTERVAL_SECS);
        assert_eq!(s.body_limit_bytes, limits::MAX_BODY_SIZE_BYTES);
    }

    #[test]
    fn test_parses_values() {
        let s = settings(&[
            ("NANOHUB_CHECKIN", "true"),
            ("NANOHUB_RETRO", "1"),
            ("NANOHUB_CERT_HEADER", "X-Client-Cert"),
            ("NANOHUB_WORKER_INTERVAL", "60"),
            ("NANOHUB_DEBUG", "yes"),
        ])
        .unwrap();
        assert!(s.checkin);
        assert!(s.retro);
        assert_eq!(s.cert_header.as_deref(), Some("X-Client-Cert"));
        assert_eq!(s.worker_interval_secs, 60);
        assert_eq!(s.effective_log_level(), "debug");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(settings(&[("NANOHUB_CHECKIN", "maybe")]).is_err());
        assert!(settings(&[("NANOHUB_WORKER_INTERVAL", "0")]).is_err());
        assert!(settings(&[("NANOHUB_WORKER_INTERVAL", "soon")]).is_err());
        assert!(settings(&[("NANOHUB_LOG_FORMAT", "xml")]).is_err());
        assert!(settings(&[("NANOHUB_INTERMEDIATE", "/tmp/int.pem")]).is_err());
    }

    #[test]
    fn test_apply_reports_missing_ca_file() {
        let s = settings(&[("NANOHUB_CA", "/nonexistent/ca.pem")]).unwrap();
        assert!(matches!(
            s.apply(HubBuilder::new()),
            Err(HubError::ConfigurationError(_))
        ));
    }
}
