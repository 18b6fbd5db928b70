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

//! Declarative Management status reports and the default status handlers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::jsonpath::PathMux;
use crate::core::constants::dm;
use crate::core::errors::{BoxError, HubError};

/// One leaf value of the `StatusItems` tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusValue {
    pub path: String,
    /// "object" or "array"
    pub container_type: String,
    /// "string", "number" or "boolean"
    pub value_type: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationStatus {
    /// Declaration class: activation, configuration, asset or management
    pub item_type: String,
    pub identifier: String,
    pub active: bool,
    pub valid: String,
    pub server_token: String,
    /// Raw `reasons` JSON, if reported
    pub reasons: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    /// Status item path the error refers to
    pub path: String,
    /// Raw error object JSON
    pub error: Vec<u8>,
}

/// Parsed status submission, handed to storage by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Stamped by the adapter's status ID function, if any
    pub id: Option<String>,
    pub raw: Vec<u8>,
    pub values: Vec<StatusValue>,
    pub errors: Vec<StatusError>,
    pub declarations: Vec<DeclarationStatus>,
}

impl StatusReport {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            raw: raw.into(),
            ..Default::default()
        }
    }
}

/// Path mux and report accumulator for a single status parse.
#[derive(Default)]
pub struct StatusSession {
    pub mux: PathMux,
    pub report: StatusReport,
    /// Paths no handler claimed during the last parse
    pub unhandled: Vec<String>,
}

impl StatusSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register default handlers (keeping custom ones) and parse `raw`.
    pub fn parse(&mut self, raw: &[u8]) -> Result<(), HubError> {
        register_status_handlers(&mut self.mux);
        self.report.raw = raw.to_vec();
        self.unhandled = self.mux.parse(&mut self.report, raw)?;
        Ok(())
    }
}

/// Register the `.StatusItems` and `.Errors` handlers unless custom handlers
/// already claim those paths.
pub fn register_status_handlers(mux: &mut PathMux) {
    mux.handle_if_absent(dm::PATH_STATUS_ITEMS, |report, path, value| {
        let mut unhandled = Vec::new();
        walk_status_items(report, path, "object", value, &mut unhandled)?;
        Ok(unhandled)
    });
    mux.handle_if_absent(dm::PATH_ERRORS, parse_errors);
}

fn walk_status_items(
    report: &mut StatusReport,
    path: &str,
    container_type: &str,
    value: &Value,
    unhandled: &mut Vec<String>,
) -> Result<(), BoxError> {
    if path == dm::PATH_DECLARATIONS {
        return parse_declarations(report, value);
    }

    let (value_type, bytes) = match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                walk_status_items(report, &format!("{}.{}", path, key), "object", child, unhandled)?;
            }
            return Ok(());
        }
        Value::Array(items) => {
            for child in items {
                walk_status_items(report, path, "array", child, unhandled)?;
            }
            return Ok(());
        }
        Value::String(s) => ("string", s.as_bytes().to_vec()),
        Value::Number(n) => ("number", n.to_string().into_bytes()),
        Value::Bool(b) => ("boolean", b.to_string().into_bytes()),
        Value::Null => {
            unhandled.push(path.to_string());
            return Ok(());
        }
    };

    report.values.push(StatusValue {
        path: path.to_string(),
        container_type: container_type.to_string(),
        value_type: value_type.to_string(),
        value: bytes,
    });
    Ok(())
}

#[derive(Deserialize)]
struct DeclarationItem {
    identifier: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    valid: String,
    #[serde(rename = "server-token", default)]
    server_token: String,
    #[serde(default)]
    reasons: Option<Value>,
}

fn parse_declarations(report: &mut StatusReport, value: &Value) -> Result<(), BoxError> {
    let classes = value
        .as_object()
        .ok_or("declarations status is not an object")?;

    for (item_type, items) in classes {
        let items: Vec<DeclarationItem> = serde_json::from_value(items.clone())?;
        for item in items {
            let reasons = match item.reasons {
                Some(r) => Some(serde_json::to_vec(&r)?),
                None => None,
            };
            report.declarations.push(DeclarationStatus {
                item_type: item_type.clone(),
                identifier: item.identifier,
                active: item.active,
                valid: item.valid,
                server_token: item.server_token,
                reasons,
            });
        }
    }
    Ok(())
}

fn parse_errors(report: &mut StatusReport, _path: &str, value: &Value) -> Result<Vec<String>, BoxError> {
    let errors = value.as_array().ok_or("status errors is not an array")?;
    for err in errors {
        let path = err
            .get("StatusItem")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        report.errors.push(StatusError {
            path,
            error: serde_json::to_vec(err)?,
        });
    }
    Ok(Vec::new())
}
