// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Masking and exclusion rules applied before an entry is serialized.

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::config::RequestLoggingConfig;
use crate::types::Header;

/// Replacement for masked values.
pub const MASK: &str = "******";

const MASK_HEADERS: &[&str] = &["auth", "api-?key", "secret", "token", "cookie"];

const MASK_QUERY_PARAMS: &[&str] = &["auth", "api-?key", "secret", "token", "password", "pwd"];

const MASK_BODY_FIELDS: &[&str] = &[
    "password",
    "pwd",
    "token",
    "secret",
    "auth",
    "card[-_ ]?number",
    "ccv",
    "ssn",
];

const EXCLUDE_PATHS: &[&str] = &[
    r"/_?healthz?$",
    r"/_?health[-_]?checks?$",
    r"/_?heart[-_]?beats?$",
    r"/ping$",
    r"/ready$",
    r"/live$",
];

const EXCLUDE_USER_AGENTS: &[&str] = &[
    r"health[-_ ]?check",
    r"microsoft-azure-application-lb",
    r"googlehc",
    r"kube-probe",
];

/// Build one case-insensitive alternation of the built-in and extra patterns.
///
/// Extra patterns that do not compile are skipped with a warning.
fn compile(builtin: &[&str], extra: &[String]) -> Option<Regex> {
    let mut patterns: Vec<String> = builtin.iter().map(|p| format!("(?:{})", p)).collect();
    for pattern in extra {
        match Regex::new(pattern) {
            Ok(_) => patterns.push(format!("(?:{})", pattern)),
            Err(e) => warn!(pattern = %pattern, error = %e, "Ignoring invalid pattern"),
        }
    }
    if patterns.is_empty() {
        return None;
    }
    Regex::new(&format!("(?i){}", patterns.join("|"))).ok()
}

fn is_match(regex: &Option<Regex>, value: &str) -> bool {
    regex.as_ref().is_some_and(|r| r.is_match(value))
}

/// Compiled masking and exclusion rules.
#[derive(Debug, Clone)]
pub struct Redactor {
    headers: Option<Regex>,
    query_params: Option<Regex>,
    body_fields: Option<Regex>,
    exclude_paths: Option<Regex>,
    exclude_user_agents: Option<Regex>,
}

impl Redactor {
    pub fn new(config: &RequestLoggingConfig) -> Self {
        Self {
            headers: compile(MASK_HEADERS, &config.mask_headers),
            query_params: compile(MASK_QUERY_PARAMS, &config.mask_query_params),
            body_fields: compile(MASK_BODY_FIELDS, &config.mask_body_fields),
            exclude_paths: compile(EXCLUDE_PATHS, &config.exclude_paths),
            exclude_user_agents: compile(EXCLUDE_USER_AGENTS, &[]),
        }
    }

    /// Health checks and probes are never logged.
    pub fn is_excluded(&self, path: &str, user_agent: Option<&str>) -> bool {
        is_match(&self.exclude_paths, path)
            || user_agent.is_some_and(|ua| is_match(&self.exclude_user_agents, ua))
    }

    pub fn mask_headers(&self, headers: &[Header]) -> Vec<Header> {
        headers
            .iter()
            .map(|(name, value)| {
                if is_match(&self.headers, name) {
                    (name.clone(), MASK.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }

    /// Mask sensitive query values, or drop the query string entirely.
    pub fn mask_url(&self, url: &str, keep_query: bool) -> String {
        let (without_fragment, fragment) = match url.split_once('#') {
            Some((head, fragment)) => (head, Some(fragment)),
            None => (url, None),
        };
        let Some((base, query)) = without_fragment.split_once('?') else {
            return url.to_string();
        };
        if !keep_query {
            return base.to_string();
        }

        let masked: Vec<String> = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if is_match(&self.query_params, key) => format!("{}={}", key, MASK),
                _ => pair.to_string(),
            })
            .collect();

        let mut result = format!("{}?{}", base, masked.join("&"));
        if let Some(fragment) = fragment {
            result.push('#');
            result.push_str(fragment);
        }
        result
    }

    /// Mask matching fields of a JSON body at any depth.
    ///
    /// Bodies that are not valid JSON are returned unchanged.
    pub fn mask_json_body(&self, body: &[u8]) -> Vec<u8> {
        let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
            return body.to_vec();
        };
        if !self.mask_value(&mut value) {
            return body.to_vec();
        }
        serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
    }

    /// Returns whether anything was masked.
    fn mask_value(&self, value: &mut Value) -> bool {
        match value {
            Value::Object(map) => {
                let mut masked = false;
                for (key, field) in map.iter_mut() {
                    if is_match(&self.body_fields, key) {
                        *field = Value::String(MASK.to_string());
                        masked = true;
                    } else {
                        masked |= self.mask_value(field);
                    }
                }
                masked
            }
            Value::Array(items) => items
                .iter_mut()
                .fold(false, |masked, item| self.mask_value(item) | masked),
            _ => false,
        }
    }
}

/// Media type without parameters, lower-cased.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Whether a body of this content type may be captured.
pub fn is_supported_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let media = media_type(content_type);
    media.starts_with("text/") || is_json_media(&media)
}

/// Whether this content type carries JSON.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| is_json_media(&media_type(ct)))
}

fn is_json_media(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}
