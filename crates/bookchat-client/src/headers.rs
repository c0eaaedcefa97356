//! Header normalization and merge precedence.
//!
//! Callers may supply headers as a plain map, a list of pairs, or a native
//! [`HeaderMap`]. All three are normalized into one `HeaderMap` before the
//! shape-agnostic merge runs.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{ClientError, Result};

/// Default content type for non-form bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Caller-supplied headers in any supported shape.
#[derive(Debug, Clone)]
pub enum HeaderInput {
    /// Name/value mapping.
    Map(HashMap<String, String>),
    /// Ordered name/value pairs. A later pair replaces an earlier one with the same name.
    Pairs(Vec<(String, String)>),
    /// An already-built header collection, kept as is (including repeated values).
    Native(HeaderMap),
}

impl From<HashMap<String, String>> for HeaderInput {
    fn from(map: HashMap<String, String>) -> Self {
        Self::Map(map)
    }
}

impl From<Vec<(String, String)>> for HeaderInput {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::Pairs(pairs)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for HeaderInput {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::Pairs(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl From<HeaderMap> for HeaderInput {
    fn from(map: HeaderMap) -> Self {
        Self::Native(map)
    }
}

fn parse_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ClientError::InvalidHeader(format!("{name}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| ClientError::InvalidHeader(format!("{name}: {e}")))?;
    Ok((name, value))
}

/// Convert any header shape into a single `HeaderMap`.
///
/// Header names are case-insensitive, so `content-type` and `Content-Type`
/// collapse into one entry.
///
/// # Errors
///
/// Returns `InvalidHeader` if a name or value is not a legal HTTP header.
pub fn normalize_headers(input: Option<HeaderInput>) -> Result<HeaderMap> {
    let Some(input) = input else {
        return Ok(HeaderMap::new());
    };

    match input {
        HeaderInput::Native(map) => Ok(map),
        HeaderInput::Map(map) => {
            let mut headers = HeaderMap::with_capacity(map.len());
            for (name, value) in &map {
                let (name, value) = parse_pair(name, value)?;
                headers.insert(name, value);
            }
            Ok(headers)
        }
        HeaderInput::Pairs(pairs) => {
            let mut headers = HeaderMap::with_capacity(pairs.len());
            for (name, value) in &pairs {
                let (name, value) = parse_pair(name, value)?;
                headers.insert(name, value);
            }
            Ok(headers)
        }
    }
}

/// Merge the request headers in increasing precedence:
/// `Authorization` (when a token is present) < `Content-Type: application/json`
/// (unless `omit_content_type`) < caller headers.
///
/// Any caller header replaces every default value of the same name.
///
/// # Errors
///
/// Returns `InvalidHeader` if the token cannot be carried in a header.
pub fn merge_headers(
    token: Option<&str>,
    omit_content_type: bool,
    caller: &HeaderMap,
) -> Result<HeaderMap> {
    let mut merged = HeaderMap::new();

    if let Some(token) = token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::InvalidHeader("authorization token".to_string()))?;
        value.set_sensitive(true);
        merged.insert(AUTHORIZATION, value);
    }

    if !omit_content_type {
        merged.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }

    for name in caller.keys() {
        merged.remove(name);
    }
    for (name, value) in caller {
        merged.append(name.clone(), value.clone());
    }

    Ok(merged)
}
