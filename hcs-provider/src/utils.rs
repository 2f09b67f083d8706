//! Utility functions for value normalization and conversion

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::sdk::ecs::Tag;

/// Convert a tag map into the request list form
pub fn expand_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

/// Parse server tags of the form "key=value" (a bare "key" has an empty value)
pub fn flatten_tags(tags: &[String]) -> BTreeMap<String, String> {
    tags.iter()
        .filter(|t| !t.is_empty())
        .map(|t| match t.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (t.to_string(), String::new()),
        })
        .collect()
}

/// Stable identifier of a data source result, derived from the matched IDs
pub fn hash_ids<S: AsRef<str>>(ids: &[S]) -> String {
    let joined = ids
        .iter()
        .map(|id| id.as_ref())
        .collect::<Vec<_>>()
        .join("-");
    format!("{:x}", Sha256::digest(joined.as_bytes()))
}

/// Map the server metadata charging mode ("0", "1", "2") to its name
pub fn normalize_charging_mode(mode: &str) -> &'static str {
    match mode {
        "1" => "prePaid",
        "2" => "spot",
        _ => "postPaid",
    }
}

/// Base64 encode user data unless it already is
pub fn encode_user_data(user_data: &str) -> String {
    if user_data.is_empty() || STANDARD.decode(user_data).is_ok() {
        user_data.to_string()
    } else {
        STANDARD.encode(user_data)
    }
}

/// RFC 3339 timestamp with second precision, empty when unknown
pub fn format_time(time: Option<&DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
