//! reqwest implementation of the SMART client contract.
//!
//! State lives in the session store under [`SMART_STATE_KEY`], so a session
//! started by one invocation (`resolve` with a code) can be reused by the
//! next (`session`, which silently refreshes when the access token expired).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use smart_inspector::storage::{read_json, write_json};
use smart_inspector::{
    ClientError, ClientSession, ClientState, Clock, SessionStore, SmartClient, SystemClock,
    TokenResponse, decode_claims,
};
use tracing::{debug, info};

/// Session store key of the serialized [`ClientState`].
pub const SMART_STATE_KEY: &str = "smartState";

const NO_STATE: &str = "No state found! Please (re)launch the app.";
const FHIR_JSON: &str = "application/fhir+json";

pub struct HttpSmartClient {
    http: reqwest::Client,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    code: Option<String>,
    seed: Option<ClientState>,
}

impl HttpSmartClient {
    pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            store,
            clock: Arc::new(SystemClock),
            code: None,
            seed: None,
        })
    }

    /// Authorization code to exchange on `ready()`.
    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    /// State to start from when the session has none stored yet.
    pub fn with_seed(mut self, seed: Option<ClientState>) -> Self {
        self.seed = seed;
        self
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn load_state(&self) -> Result<Option<ClientState>, ClientError> {
        read_json(self.store.as_ref(), SMART_STATE_KEY)
            .map_err(|e| ClientError::rejected(format!("Unreadable client state: {e}")))
    }

    fn save_state(&self, state: &ClientState) -> Result<(), ClientError> {
        write_json(self.store.as_ref(), SMART_STATE_KEY, state)
            .map_err(|e| ClientError::rejected(format!("Cannot store client state: {e}")))
    }

    fn is_expired(&self, state: &ClientState) -> bool {
        let exp = state.expires_at.or_else(|| {
            let token = state.access_token()?;
            decode_claims(token).ok()?.expires_at()
        });
        exp.is_some_and(|exp| exp <= self.clock.now_unix())
    }

    async fn token_uri(&self, state: &mut ClientState) -> Result<String, ClientError> {
        if let Some(uri) = &state.token_uri {
            return Ok(uri.clone());
        }

        let url = format!(
            "{}/.well-known/smart-configuration",
            state.server_url.trim_end_matches('/')
        );
        debug!(%url, "discovering SMART configuration");
        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("Failed to connect to server: {e}")))?;
        let config = handle_response(resp).await?;

        let uri = config
            .get("token_endpoint")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::rejected(format!("No token_endpoint in {url}")))?
            .to_string();
        state.token_uri = Some(uri.clone());
        Ok(uri)
    }

    async fn exchange_code(&self, state: &mut ClientState, code: &str) -> Result<(), ClientError> {
        let token_uri = self.token_uri(state).await?;

        let mut form = vec![("grant_type", "authorization_code"), ("code", code)];
        if let Some(uri) = state.redirect_uri.as_deref() {
            form.push(("redirect_uri", uri));
        }
        if !state.client_id.is_empty() {
            form.push(("client_id", state.client_id.as_str()));
        }
        if let Some(verifier) = state.code_verifier.as_deref() {
            form.push(("code_verifier", verifier));
        }

        let response = self.post_token(&token_uri, &form).await?;
        info!(client_id = %state.client_id, "exchanged authorization code");
        self.apply(state, response, None);
        Ok(())
    }

    async fn refresh(&self, state: &mut ClientState) -> Result<(), ClientError> {
        let refresh_token = state
            .refresh_token()
            .ok_or_else(|| {
                ClientError::rejected(
                    "Access token expired and no refresh token is available. Please (re)launch the app.",
                )
            })?
            .to_string();
        let token_uri = self.token_uri(state).await?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        if !state.client_id.is_empty() {
            form.push(("client_id", state.client_id.as_str()));
        }

        let response = self.post_token(&token_uri, &form).await?;
        info!(client_id = %state.client_id, "refreshed access token");
        self.apply(state, response, Some(refresh_token));
        Ok(())
    }

    async fn post_token(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, ClientError> {
        let resp = self
            .http
            .post(token_uri)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("Failed to connect to server: {e}")))?;

        let status = resp.status();
        let body = read_body(resp).await?;
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: oauth_error_message(&body),
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| ClientError::transport(format!("Failed to parse token response: {e}")))
    }

    fn apply(&self, state: &mut ClientState, mut response: TokenResponse, previous: Option<String>) {
        if response.refresh_token.is_none() {
            response.refresh_token = previous;
        }
        state.expires_at = response
            .expires_in
            .and_then(|secs| expiry_after(self.clock.now_unix(), secs));
        state.token_response = Some(response);
    }
}

#[async_trait]
impl SmartClient for HttpSmartClient {
    async fn ready(&self) -> Result<Arc<dyn ClientSession>, ClientError> {
        let mut state = match (self.load_state()?, &self.seed) {
            (Some(state), _) => state,
            (None, Some(seed)) if self.code.is_some() => seed.clone(),
            _ => return Err(ClientError::rejected(NO_STATE)),
        };

        if let Some(code) = &self.code {
            self.exchange_code(&mut state, code).await?;
            self.save_state(&state)?;
        } else if state.token_response.is_none() {
            return Err(ClientError::rejected(NO_STATE));
        } else if self.is_expired(&state) {
            self.refresh(&mut state).await?;
            self.save_state(&state)?;
        }

        Ok(Arc::new(HttpSession {
            http: self.http.clone(),
            state,
        }))
    }
}

/// Bearer-authenticated session against the FHIR server.
pub struct HttpSession {
    http: reqwest::Client,
    state: ClientState,
}

impl HttpSession {
    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.state.server_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

#[async_trait]
impl ClientSession for HttpSession {
    fn state(&self) -> &ClientState {
        &self.state
    }

    fn fhir_user(&self) -> Option<String> {
        let claims = decode_claims(self.state.id_token()?).ok()?;
        claims
            .claim_str("fhirUser")
            .or_else(|| claims.claim_str("profile"))
            .map(str::to_string)
    }

    async fn request(&self, url: &str) -> Result<Value, ClientError> {
        let url = self.resolve_url(url);
        let mut req = self.http.get(&url).header("Accept", FHIR_JSON);
        if let Some(token) = self.state.access_token() {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("Failed to connect to server: {e}")))?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value, ClientError> {
    let status = resp.status();
    let body = read_body(resp).await?;

    if !status.is_success() {
        return Err(ClientError::Http {
            status: status.as_u16(),
            message: operation_outcome_message(&body).unwrap_or(body),
        });
    }

    if body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| ClientError::transport(format!("Failed to parse response JSON: {e}")))
}

async fn read_body(resp: reqwest::Response) -> Result<String, ClientError> {
    resp.text()
        .await
        .map_err(|e| ClientError::transport(format!("Failed to read response body: {e}")))
}

/// `now + expires_in`, or `None` when the server's value does not fit.
fn expiry_after(now: i64, expires_in: u64) -> Option<i64> {
    i64::try_from(expires_in).ok().and_then(|secs| now.checked_add(secs))
}

fn operation_outcome_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    if json.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
        return None;
    }
    let msgs: Vec<&str> = json
        .get("issue")?
        .as_array()?
        .iter()
        .filter_map(|i| i.get("diagnostics").and_then(Value::as_str))
        .collect();
    (!msgs.is_empty()).then(|| msgs.join("; "))
}

fn oauth_error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    match (
        json.get("error").and_then(Value::as_str),
        json.get("error_description").and_then(Value::as_str),
    ) {
        (Some(error), Some(description)) => format!("{error}: {description}"),
        (Some(error), None) => error.to_string(),
        _ => body.to_string(),
    }
}
