//! Sim-parameter codec.
//!
//! Standalone launches carry a simulated launch context inside the audience
//! URL, e.g. `https://launcher.example.org/v/r4/sim/<payload>/fhir`. The
//! payload is the compact JSON serialization of the [`LaunchContext`],
//! base64url-encoded without padding. Object keys serialize in sorted order,
//! so the same context always encodes to the same string.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use regex::Regex;
use serde_json::Value;

use crate::claims::decode_base64url;
use crate::launch::LaunchContext;

static SIM_SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/sim/([^/]+)/").expect("Invalid sim segment regex"));

/// Errors that can occur while decoding a sim payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The payload is empty.
    #[error("Invalid sim payload: empty")]
    Empty,

    /// The payload is not valid base64url.
    #[error("Invalid sim payload encoding: {0}")]
    InvalidEncoding(String),

    /// The decoded payload is not valid JSON.
    #[error("Invalid sim payload JSON: {0}")]
    InvalidJson(String),

    /// The decoded payload is JSON but not an object.
    #[error("Invalid sim payload: expected a JSON object")]
    NotAnObject,
}

/// Encodes a launch context into a sim payload.
#[must_use]
pub fn encode_sim(context: &LaunchContext) -> String {
    let json = Value::Object(context.as_map().clone()).to_string();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decodes a sim payload back into a launch context.
///
/// # Errors
///
/// Returns [`SimError`] unless the whole payload decodes to a JSON object;
/// partial results are never returned.
pub fn decode_sim(payload: &str) -> Result<LaunchContext, SimError> {
    if payload.is_empty() {
        return Err(SimError::Empty);
    }

    let bytes = decode_base64url(payload).map_err(SimError::InvalidEncoding)?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| SimError::InvalidJson(e.to_string()))?;

    match value {
        Value::Object(map) => Ok(LaunchContext::from_map(map)),
        _ => Err(SimError::NotAnObject),
    }
}

/// Extracts the `<payload>` of a `/sim/<payload>/` path segment.
///
/// Returns `None` when the audience URL has no sim segment.
#[must_use]
pub fn extract_sim_segment(aud: &str) -> Option<&str> {
    SIM_SEGMENT_REGEX
        .captures(aud)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Builds a standalone-launch audience URL embedding `context`.
///
/// # Examples
///
/// ```
/// use smart_inspector::launch::LaunchContext;
/// use smart_inspector::sim::{build_sim_aud, decode_sim, extract_sim_segment};
///
/// let ctx = LaunchContext::with_patient("standalone-patient", "123");
/// let aud = build_sim_aud("https://launcher.example.org/v/r4/", &ctx);
/// assert!(aud.ends_with("/fhir"));
///
/// let payload = extract_sim_segment(&aud).unwrap();
/// assert_eq!(decode_sim(payload).unwrap(), ctx);
/// ```
#[must_use]
pub fn build_sim_aud(base_url: &str, context: &LaunchContext) -> String {
    format!(
        "{}/sim/{}/fhir",
        base_url.trim_end_matches('/'),
        encode_sim(context)
    )
}
