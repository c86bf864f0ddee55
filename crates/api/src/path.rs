//! Request URL templating.

use percent_encoding::{AsciiSet, CONTROLS, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use crate::error::ApiError;
use crate::operation::Payload;

/// Characters escaped inside a substituted path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Characters left as-is in query keys and values.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Text form of a payload value: strings verbatim, everything else as JSON.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builds `{api_url}{path}/` with every `:param` segment replaced by the
/// payload value of the same name. Substituted keys are removed from the
/// payload.
pub(crate) fn request_url(api_url: &str, path: &str, payload: &mut Payload) -> Result<String, ApiError> {
    let mut resolved = Vec::new();
    for segment in path.split('/') {
        match segment.strip_prefix(':') {
            Some(param) if !param.is_empty() => {
                let value = payload.remove(param).ok_or_else(|| ApiError::MissingPathParam {
                    param: param.to_string(),
                    path: path.to_string(),
                })?;
                resolved.push(utf8_percent_encode(&value_text(&value), SEGMENT).to_string());
            }
            _ => resolved.push(segment.to_string()),
        }
    }

    let mut url = format!("{api_url}{}", resolved.join("/"));
    if !url.ends_with('/') {
        url.push('/');
    }
    Ok(url)
}

/// Encodes the payload as `key=value&...`. Arrays repeat their key; nulls
/// are skipped.
pub(crate) fn query_string(payload: &Payload) -> String {
    let mut pairs = Vec::new();
    for (key, value) in payload {
        let key = utf8_percent_encode(key, QUERY).to_string();
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push(format!("{key}={}", utf8_percent_encode(&value_text(item), QUERY)));
                }
            }
            other => pairs.push(format!("{key}={}", utf8_percent_encode(&value_text(other), QUERY))),
        }
    }
    pairs.join("&")
}
