//! Read-only session views for presenters.
//!
//! Builds display data from a [`ClientState`]: the raw tokens, their decoded
//! (unverified) claims and expiry timestamps. Nothing here returns an access
//! decision; claims are carried along purely so they can be rendered.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::claims::{ClaimsError, TokenClaims, decode_claims};
use crate::client::ClientState;
use crate::countdown::{Countdown, DEFAULT_TICK, SystemClock};
use crate::error::InspectorError;

/// Which token of the token response a view describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Id,
    Refresh,
}

impl TokenKind {
    /// Field name in the token response.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Id => "id_token",
            Self::Refresh => "refresh_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => write!(f, "Access Token"),
            Self::Id => write!(f, "ID Token"),
            Self::Refresh => write!(f, "Refresh Token"),
        }
    }
}

/// A token string together with its decoded claims.
#[derive(Debug, Clone)]
pub struct TokenView {
    pub kind: TokenKind,
    pub raw: String,
    pub claims: Result<TokenClaims, ClaimsError>,
}

impl TokenView {
    #[must_use]
    pub fn new(kind: TokenKind, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let claims = decode_claims(&raw);
        Self { kind, raw, claims }
    }

    /// Decoded claims, or the decode failure as a panel-local error.
    pub fn claims(&self) -> Result<&TokenClaims, InspectorError> {
        self.claims
            .as_ref()
            .map_err(|e| InspectorError::ClaimsDecodeFailed(e.clone()))
    }

    /// Whether the token looked like a JWT.
    #[must_use]
    pub fn is_decoded(&self) -> bool {
        self.claims.is_ok()
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.claims.as_ref().ok()?.expires_at()
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.claims.as_ref().ok()?.issued_at()
    }

    /// A countdown to `exp`, if the token carries one.
    #[must_use]
    pub fn countdown(&self) -> Option<Countdown> {
        self.countdown_with(DEFAULT_TICK)
    }

    /// A countdown to `exp` re-rendering every `tick`.
    #[must_use]
    pub fn countdown_with(&self, tick: Duration) -> Option<Countdown> {
        let exp = self.expires_at()?;
        Some(Countdown::with_clock(exp, tick, Arc::new(SystemClock)))
    }
}

/// Everything a session panel shows, derived from the client state.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub server_url: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub uses_pkce: bool,
    pub patient: Option<String>,
    pub encounter: Option<String>,
    /// Access token expiry as recorded by the client (`expires_in` based).
    pub expires_at: Option<i64>,
    /// Present tokens, in access, id, refresh order.
    pub tokens: Vec<TokenView>,
}

impl SessionSummary {
    #[must_use]
    pub fn from_state(state: &ClientState) -> Self {
        let granted = state
            .token_response
            .as_ref()
            .and_then(|t| t.scope.as_deref())
            .unwrap_or(state.scope.as_str());

        let tokens = [
            (TokenKind::Access, state.access_token()),
            (TokenKind::Id, state.id_token()),
            (TokenKind::Refresh, state.refresh_token()),
        ]
        .into_iter()
        .filter_map(|(kind, raw)| raw.map(|raw| TokenView::new(kind, raw)))
        .collect();

        Self {
            server_url: state.server_url.clone(),
            client_id: state.client_id.clone(),
            scopes: granted.split_whitespace().map(str::to_string).collect(),
            uses_pkce: state.uses_pkce(),
            patient: state.patient_id().map(str::to_string),
            encounter: state.encounter_id().map(str::to_string),
            expires_at: state.expires_at,
            tokens,
        }
    }

    #[must_use]
    pub fn token(&self, kind: TokenKind) -> Option<&TokenView> {
        self.tokens.iter().find(|t| t.kind == kind)
    }
}
