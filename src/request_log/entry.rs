// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Serialized shape of a request log entry.
//!
//! Each entry is one line of NDJSON. Headers are `[name, value]` pairs and
//! bodies are base64 strings. An absent body is an absent field.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::LogRecord;
use crate::types::Header;

/// One request/response pair with its captured logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub uuid: Uuid,
    pub request: RequestData,
    pub response: ResponseData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub timestamp: f64,
    pub method: String,
    pub path: Option<String>,
    pub url: String,
    pub headers: Vec<Header>,
    pub size: Option<u64>,
    pub consumer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_body")]
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    pub status_code: u16,
    /// Seconds.
    pub response_time: f64,
    pub headers: Vec<Header>,
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_body")]
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionData {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub stacktrace: String,
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match body {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
