//! SMART launch context as seen by the app.
//!
//! A [`LaunchContext`] is a free-form JSON object describing how the app was
//! launched: launch type, requested scope, patient/encounter ids, client id,
//! redirect URIs, simulated-error flags, JWKS info. It is recovered either
//! from the payload carried by an authorization `code` (EHR launch) or from
//! the sim segment of a standalone `aud` URL.
//!
//! # Lifecycle
//!
//! - Derived once per mount from the URL
//! - Cached in session storage under [`LAUNCH_PARAMS_KEY`]
//! - Read back as a fallback while a live session is still being acquired

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Session storage key holding the JSON-serialized launch context.
pub const LAUNCH_PARAMS_KEY: &str = "launchParams";

/// Launch context recovered from the URL.
///
/// Keys are kept exactly as received; typed accessors cover the fields the
/// presenters care about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchContext(Map<String, Value>);

impl LaunchContext {
    /// Wraps an already-decoded JSON object.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Creates a context for a launch with a patient in scope.
    ///
    /// # Examples
    ///
    /// ```
    /// use smart_inspector::launch::LaunchContext;
    ///
    /// let ctx = LaunchContext::with_patient("standalone-patient", "123");
    /// assert_eq!(ctx.launch_type(), Some("standalone-patient"));
    /// assert_eq!(ctx.patient(), Some("123"));
    /// ```
    #[must_use]
    pub fn with_patient(launch_type: impl Into<String>, patient: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("launch_type".into(), Value::String(launch_type.into()));
        map.insert("patient".into(), Value::String(patient.into()));
        Self(map)
    }

    /// Sets a field, returning the updated context.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Launch type, e.g. `provider-ehr`, `standalone-patient`.
    #[must_use]
    pub fn launch_type(&self) -> Option<&str> {
        self.get_str("launch_type")
    }

    #[must_use]
    pub fn patient(&self) -> Option<&str> {
        self.get_str("patient")
    }

    #[must_use]
    pub fn encounter(&self) -> Option<&str> {
        self.get_str("encounter")
    }

    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.get_str("provider")
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.get_str("client_id")
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.get_str("scope")
    }

    /// Simulated authorization error the launcher was asked to produce.
    #[must_use]
    pub fn sim_error(&self) -> Option<&str> {
        self.get_str("auth_error")
    }

    #[must_use]
    pub fn jwks_url(&self) -> Option<&str> {
        self.get_str("jwks_url")
    }

    /// Redirect URIs, given either as an array or a comma-separated string.
    #[must_use]
    pub fn redirect_uris(&self) -> Vec<&str> {
        match self.0.get("redirect_uris") {
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Returns true if no fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for LaunchContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_launch_context_creation() {
        let ctx = LaunchContext::with_patient("provider-ehr", "patient456")
            .with("encounter", "enc-1")
            .with("client_id", "my-app");
        assert_eq!(ctx.launch_type(), Some("provider-ehr"));
        assert_eq!(ctx.patient(), Some("patient456"));
        assert_eq!(ctx.encounter(), Some("enc-1"));
        assert_eq!(ctx.client_id(), Some("my-app"));
        assert!(ctx.provider().is_none());
        assert!(!ctx.is_empty());
        assert!(LaunchContext::default().is_empty());
    }

    #[test]
    fn test_empty_strings_read_as_absent() {
        let ctx = LaunchContext::default().with("patient", "");
        assert!(ctx.patient().is_none());
        assert_eq!(ctx.get("patient"), Some(&json!("")));
    }

    #[test]
    fn test_redirect_uris_forms() {
        let ctx = LaunchContext::default().with(
            "redirect_uris",
            "http://localhost/a, http://localhost/b,",
        );
        assert_eq!(
            ctx.redirect_uris(),
            vec!["http://localhost/a", "http://localhost/b"]
        );

        let ctx = LaunchContext::default().with("redirect_uris", json!(["https://app/cb"]));
        assert_eq!(ctx.redirect_uris(), vec!["https://app/cb"]);

        assert!(LaunchContext::default().redirect_uris().is_empty());
    }

    #[test]
    fn test_launch_context_serialization_is_transparent() {
        let ctx = LaunchContext::with_patient("standalone-patient", "123")
            .with("auth_error", "auth_invalid_scope");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(
            json,
            json!({
                "launch_type": "standalone-patient",
                "patient": "123",
                "auth_error": "auth_invalid_scope"
            })
        );

        let back: LaunchContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
        assert_eq!(back.sim_error(), Some("auth_invalid_scope"));
    }
}
