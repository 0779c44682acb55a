//! Custom call parameters
//!
//! The SDK hands custom parameters over as a JSON string wrapping a form-encoded query
//! string (`"a=1&b=hello%20world"`). They are decoded into [`CustomParams`] as soon as
//! a push message is parsed and re-serialized to JSON only when an event is encoded for
//! the host.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Caller-supplied key/value metadata attached to a call, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomParams(BTreeMap<String, String>);

impl CustomParams {
    /// An empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a form-encoded query string
    ///
    /// Surrounding double quotes are stripped first. Segments without `=` are skipped,
    /// so input with no `=` at all yields an empty mapping. `%XX` becomes a byte and `+`
    /// a space; a value that does not decode to UTF-8 collapses the whole mapping to
    /// empty rather than failing.
    pub fn from_query(raw: &str) -> Self {
        let trimmed = strip_quotes(raw);
        let mut params = BTreeMap::new();

        for segment in trimmed.split('&') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            match decode_component(value) {
                Some(decoded) => {
                    params.insert(key.to_string(), decoded);
                }
                None => {
                    warn!(key = %key, "custom parameter is not valid UTF-8, dropping all parameters");
                    return Self::default();
                }
            }
        }

        Self(params)
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no parameters
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compact JSON object, as embedded in host event strings
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl FromIterator<(String, String)> for CustomParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn strip_quotes(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

/// Form-decode a single value (`+` → space, `%XX` → byte)
fn decode_component(value: &str) -> Option<String> {
    let decoded = url::form_urlencoded::parse(format!("v={}", value).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default();
    // parse() decodes lossily; a replacement char absent from the input means bad UTF-8
    if decoded.contains('\u{FFFD}') && !value.contains('\u{FFFD}') {
        return None;
    }
    Some(decoded)
}
