//! Contract of the external SMART client.
//!
//! The authorization-code exchange and token refresh are not performed by
//! the core. They are delegated to a [`SmartClient`] whose [`ready`]
//! future settles once a session is usable. The resulting
//! [`ClientSession`] is read-only from the core's point of view: it only
//! reads [`ClientSession::state`] and invokes the read operations.
//!
//! [`ready`]: SmartClient::ready

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors reported by the external client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// `ready()` rejected; the message is shown to the user as-is.
    #[error("{0}")]
    Rejected(String),

    /// An HTTP request failed.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body or OperationOutcome diagnostics.
        message: String,
    },

    /// The session has no value for a required launch context field.
    #[error("No {0} in the current launch context")]
    MissingContext(&'static str),

    /// Transport-level failure (connect, timeout, decode).
    #[error("{0}")]
    Transport(String),
}

impl ClientError {
    /// Creates a new `Rejected` error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Token endpoint response as kept by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Launch context: current patient id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,
    /// Launch context: current encounter id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,
    /// Everything else the server returned (`need_patient_banner`,
    /// `smart_style_url`, `fhirContext`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client state record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    /// FHIR base URL.
    pub server_url: String,
    /// Requested scopes, space-delimited.
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub client_id: String,
    /// PKCE challenge sent with the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// PKCE verifier matching `code_challenge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    /// Access token expiry in Unix seconds, computed from `expires_in`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_response: Option<TokenResponse>,
}

impl ClientState {
    /// Whether the authorization request used PKCE.
    #[must_use]
    pub fn uses_pkce(&self) -> bool {
        self.code_challenge.is_some()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.token_response.as_ref()?.access_token.as_deref()
    }

    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.token_response.as_ref()?.id_token.as_deref()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.token_response.as_ref()?.refresh_token.as_deref()
    }

    #[must_use]
    pub fn patient_id(&self) -> Option<&str> {
        self.token_response.as_ref()?.patient.as_deref()
    }

    #[must_use]
    pub fn encounter_id(&self) -> Option<&str> {
        self.token_response.as_ref()?.encounter.as_deref()
    }
}

/// A ready session obtained from the external client.
#[async_trait]
pub trait ClientSession: Send + Sync {
    /// The client's state record.
    fn state(&self) -> &ClientState;

    /// URL of the authenticated user's FHIR resource, if known.
    fn fhir_user(&self) -> Option<String>;

    /// Authenticated GET of `url`, absolute or relative to the server URL.
    async fn request(&self, url: &str) -> Result<Value, ClientError>;

    /// Reads the in-context Patient.
    async fn read_patient(&self) -> Result<Value, ClientError> {
        let id = self
            .state()
            .patient_id()
            .ok_or(ClientError::MissingContext("patient"))?
            .to_string();
        self.request(&format!("Patient/{id}")).await
    }

    /// Reads the in-context Encounter.
    async fn read_encounter(&self) -> Result<Value, ClientError> {
        let id = self
            .state()
            .encounter_id()
            .ok_or(ClientError::MissingContext("encounter"))?
            .to_string();
        self.request(&format!("Encounter/{id}")).await
    }
}

impl fmt::Debug for dyn ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("server_url", &self.state().server_url)
            .field("client_id", &self.state().client_id)
            .finish_non_exhaustive()
    }
}

/// The external SMART client.
#[async_trait]
pub trait SmartClient: Send + Sync {
    /// Settles once an authorization or refresh exchange has completed.
    async fn ready(&self) -> Result<Arc<dyn ClientSession>, ClientError>;
}
