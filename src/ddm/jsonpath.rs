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

//! Path-keyed JSON dispatch.
//!
//! Paths are dotted object-key chains from the document root: `.StatusItems`,
//! `.StatusItems.device.identifier`. Handlers registered beneath a key are
//! dispatched before the key's own handler, which receives the remainder of
//! the object. Keys no handler claims are reported as unhandled paths.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::status::StatusReport;
use crate::core::errors::{BoxError, HubError};

/// Handler for one registered path. Returns further unhandled paths, if any.
pub type PathHandler =
    Box<dyn FnMut(&mut StatusReport, &str, &Value) -> Result<Vec<String>, BoxError> + Send>;

#[derive(Default)]
pub struct PathMux {
    handlers: HashMap<String, PathHandler>,
}

impl PathMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any handler on the same path.
    pub fn handle<F>(&mut self, path: impl Into<String>, handler: F)
    where
        F: FnMut(&mut StatusReport, &str, &Value) -> Result<Vec<String>, BoxError> + Send + 'static,
    {
        self.handlers.insert(path.into(), Box::new(handler));
    }

    /// Register a handler unless one already exists. Returns true if registered.
    pub fn handle_if_absent<F>(&mut self, path: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&mut StatusReport, &str, &Value) -> Result<Vec<String>, BoxError> + Send + 'static,
    {
        let path = path.into();
        if self.handlers.contains_key(&path) {
            return false;
        }
        self.handlers.insert(path, Box::new(handler));
        true
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.handlers.contains_key(path)
    }

    fn has_descendant(&self, path: &str) -> bool {
        self.handlers
            .keys()
            .any(|k| k.len() > path.len() && k.starts_with(path) && k[path.len()..].starts_with('.'))
    }

    /// Parse `raw` as a JSON object and dispatch its keys into `report`.
    /// Returns the paths no handler claimed.
    pub fn parse(&mut self, report: &mut StatusReport, raw: &[u8]) -> Result<Vec<String>, HubError> {
        let root: Value = serde_json::from_slice(raw)
            .map_err(|e| HubError::ParseError(format!("decoding status JSON: {}", e)))?;
        let obj = root
            .as_object()
            .ok_or_else(|| HubError::ParseError("status report is not a JSON object".to_string()))?;

        let mut unhandled = Vec::new();
        self.dispatch_object("", obj, report, &mut unhandled)?;
        Ok(unhandled)
    }

    /// True if `path` has its own handler or one registered beneath it.
    fn claims(&self, path: &str) -> bool {
        self.handlers.contains_key(path) || self.has_descendant(path)
    }

    fn dispatch_object(
        &mut self,
        prefix: &str,
        obj: &Map<String, Value>,
        report: &mut StatusReport,
        unhandled: &mut Vec<String>,
    ) -> Result<(), HubError> {
        for (key, value) in obj {
            self.dispatch_value(format!("{}.{}", prefix, key), value, report, unhandled)?;
        }
        Ok(())
    }

    /// Nested handlers run first; the handler on `path` then sees only the
    /// keys they did not claim.
    fn dispatch_value(
        &mut self,
        path: String,
        value: &Value,
        report: &mut StatusReport,
        unhandled: &mut Vec<String>,
    ) -> Result<(), HubError> {
        let residual = match value.as_object() {
            Some(obj) if self.has_descendant(&path) => {
                let mut rest = Map::new();
                for (key, child) in obj {
                    let child_path = format!("{}.{}", path, key);
                    if self.claims(&child_path) {
                        self.dispatch_value(child_path, child, report, unhandled)?;
                    } else {
                        rest.insert(key.clone(), child.clone());
                    }
                }
                Some(rest)
            }
            _ => None,
        };

        match (self.handlers.get_mut(&path), residual) {
            (Some(handler), Some(rest)) => {
                let more = handler(report, &path, &Value::Object(rest))
                    .map_err(|e| HubError::ParseError(format!("handling {}: {}", path, e)))?;
                unhandled.extend(more);
            }
            (Some(handler), None) => {
                let more = handler(report, &path, value)
                    .map_err(|e| HubError::ParseError(format!("handling {}: {}", path, e)))?;
                unhandled.extend(more);
            }
            (None, Some(rest)) => {
                unhandled.extend(rest.keys().map(|key| format!("{}.{}", path, key)));
            }
            (None, None) => unhandled.push(path),
        }
        Ok(())
    }
}
