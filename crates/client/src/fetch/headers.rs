//! Conversion from reqwest header maps to the agent's header pairs.

use reqwest::header::HeaderMap;

/// Flatten a header map into `(name, value)` pairs, dropping values that are not valid UTF-8.
pub fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
