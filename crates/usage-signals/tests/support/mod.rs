// Each integration test compiles this module independently via `mod support;`,
// so items used by one test appear unused in others.
#![allow(unused)]

pub mod collector;

use serde_json::Value;

/// Event names in a collected bulk body, in order.
pub fn event_names(body: &Value) -> Vec<String> {
    body["transactions"]
        .as_array()
        .expect("body has a transactions array")
        .iter()
        .map(|t| t["event_name"].as_str().unwrap_or_default().to_owned())
        .collect()
}
