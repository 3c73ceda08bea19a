// Copyright 2026 Daniel Pelikan
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

//! Host method-call protocol.
//!
//! One JSON object per line in each direction. Calls carry a method name
//! and an argument object; responses echo the call id.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bluetooth::DeviceInfo;
use crate::error::{BridgeError, Result as BridgeResult};
use crate::events::BridgeEvent;

/// Error string for calls naming an unknown method.
pub const NOT_IMPLEMENTED: &str = "notImplemented";

/// Error string for lines that are not a valid call.
pub const BAD_REQUEST: &str = "badRequest";

/// A method call from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    /// Correlation id echoed in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    pub method: String,

    /// Argument mapping, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl MethodCall {
    pub fn new(method: &str) -> Self {
        Self {
            id: None,
            method: method.to_string(),
            args: None,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json.trim())?)
    }

    /// The argument object, if `args` is one.
    pub fn arg_map(&self) -> Option<&Map<String, Value>> {
        self.args.as_ref()?.as_object()
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.arg_map()?.get(key)
    }

    /// The device address argument. `device` is accepted as an alias.
    ///
    /// `Ok(None)` when the call has no arguments or neither key is set.
    /// Non-object arguments or a non-string address are an error.
    pub fn address(&self) -> BridgeResult<Option<&str>> {
        let Some(args) = &self.args else {
            return Ok(None);
        };
        let map = args
            .as_object()
            .ok_or(BridgeError::InvalidArgument("args"))?;

        match map.get("address").or_else(|| map.get("device")) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.as_str())),
            Some(_) => Err(BridgeError::InvalidArgument("address")),
        }
    }

    /// The `data` argument as bytes.
    ///
    /// A string yields its UTF-8 bytes. An array yields every entry that is
    /// an integer in `0..=255`; anything else in the array is skipped.
    pub fn data(&self) -> Option<Vec<u8>> {
        match self.arg("data")? {
            Value::String(text) => Some(text.as_bytes().to_vec()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|v| u8::try_from(v).ok())
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Result value of a method call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Bool(bool),
    Count(usize),
    /// Raw bytes, encoded as an array of integers.
    Bytes(Vec<u8>),
    Text(String),
    Devices(Vec<DeviceInfo>),
}

/// Response line sent back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Reply>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl MethodResponse {
    pub fn success(id: Option<u64>, reply: Reply) -> Self {
        Self {
            id,
            result: Some(reply),
            error: None,
        }
    }

    pub fn not_implemented(id: Option<u64>) -> Self {
        Self {
            id,
            result: None,
            error: Some(NOT_IMPLEMENTED),
        }
    }

    pub fn bad_request() -> Self {
        Self {
            id: None,
            result: None,
            error: Some(BAD_REQUEST),
        }
    }

    /// Serialize to a JSON line.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Serialize an event to a JSON line.
pub fn event_to_json(event: &BridgeEvent) -> Result<String> {
    let mut json = serde_json::to_string(event)?;
    json.push('\n');
    Ok(json)
}
