//! Unverified decoding of JWT-shaped tokens.
//!
//! A token is split on `.`; the first segment is decoded as the header and
//! the second as the payload. Each segment must be base64url-encoded JSON.
//! No signature is checked: the output of this module is advisory and is
//! only ever rendered, never used to authorize anything.
//!
//! ## Example
//!
//! ```
//! use smart_inspector::claims::decode_claims;
//!
//! // {"alg":"none"} . {"sub":"alice"}
//! let claims = decode_claims("eyJhbGciOiJub25lIn0.eyJzdWIiOiJhbGljZSJ9.").unwrap();
//! assert_eq!(claims.algorithm(), Some("none"));
//! assert_eq!(claims.subject(), Some("alice"));
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde_json::{Map, Value};

/// Errors that can occur while decoding token segments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsError {
    /// The token does not contain a header and a payload segment.
    #[error("expected at least 2 dot-separated segments, found {0}")]
    MissingSegments(usize),

    /// A segment is not valid base64url.
    #[error("{segment} is not valid base64url: {message}")]
    InvalidBase64 {
        /// Which segment failed (`header` or `payload`).
        segment: &'static str,
        /// Decoder message.
        message: String,
    },

    /// A segment decoded to bytes that are not UTF-8 JSON.
    #[error("{segment} is not valid JSON: {message}")]
    InvalidJson {
        /// Which segment failed (`header` or `payload`).
        segment: &'static str,
        /// Parser message.
        message: String,
    },

    /// A segment decoded to JSON that is not an object.
    #[error("{segment} is not a JSON object")]
    NotAnObject {
        /// Which segment failed (`header` or `payload`).
        segment: &'static str,
    },
}

/// Header and payload of a decoded token.
///
/// Both maps are exactly what the issuer put in the token. They are not
/// validated in any way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenClaims {
    /// JOSE header (`alg`, `typ`, `kid`, ...).
    pub header: Map<String, Value>,
    /// Claims set (`exp`, `iat`, `sub`, `scope`, context fields, ...).
    pub payload: Map<String, Value>,
}

impl TokenClaims {
    /// Returns a payload claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Returns a string payload claim by name.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claim(name).and_then(Value::as_str)
    }

    /// `exp` as Unix seconds.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.numeric_date("exp")
    }

    /// `iat` as Unix seconds.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.numeric_date("iat")
    }

    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.claim_str("sub")
    }

    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claim_str("iss")
    }

    /// Header `alg`.
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }

    /// Space-delimited `scope` claim split into individual scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.claim_str("scope")
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    // NumericDate may legally carry a fractional part.
    fn numeric_date(&self, name: &str) -> Option<i64> {
        let value = self.claim(name)?;
        if let Some(secs) = value.as_i64() {
            return Some(secs);
        }
        let f = value.as_f64()?.trunc();
        // Out-of-range values are not a date rather than a saturated one.
        (f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
    }
}

/// Decodes the header and payload of a JWT-shaped token.
///
/// # Errors
///
/// Fails with [`ClaimsError`] if the token has fewer than two segments or if
/// either segment is not base64url-encoded JSON object.
pub fn decode_claims(token: &str) -> Result<TokenClaims, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() < 2 {
        return Err(ClaimsError::MissingSegments(segments.len()));
    }

    Ok(TokenClaims {
        header: decode_segment(segments[0], "header")?,
        payload: decode_segment(segments[1], "payload")?,
    })
}

/// Decodes only the payload (second) segment of a JWT-shaped token.
///
/// The header segment is not inspected.
///
/// # Errors
///
/// Fails with [`ClaimsError`] if there is no second segment or it is not a
/// base64url-encoded JSON object.
pub fn decode_payload(token: &str) -> Result<Map<String, Value>, ClaimsError> {
    let segments: Vec<&str> = token.split('.').collect();
    match segments.get(1) {
        Some(payload) => decode_segment(payload, "payload"),
        None => Err(ClaimsError::MissingSegments(segments.len())),
    }
}

/// Decodes a single base64url segment into a JSON object.
pub(crate) fn decode_segment(
    segment: &str,
    name: &'static str,
) -> Result<Map<String, Value>, ClaimsError> {
    let bytes = decode_base64url(segment).map_err(|message| ClaimsError::InvalidBase64 {
        segment: name,
        message,
    })?;

    let value: Value = serde_json::from_slice(&bytes).map_err(|e| ClaimsError::InvalidJson {
        segment: name,
        message: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ClaimsError::NotAnObject { segment: name }),
    }
}

/// Lenient base64url decoding.
///
/// Accepts trailing `=` padding and the standard-alphabet `+` and `/`, both of
/// which show up in tokens minted by less careful issuers.
pub(crate) fn decode_base64url(input: &str) -> Result<Vec<u8>, String> {
    let normalized: String = input
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| e.to_string())
}
