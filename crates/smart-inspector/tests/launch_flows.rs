//! End-to-end launch resolution through the public API.
//!
//! Exercises the resolver with an in-memory client and session store the
//! way a front end would: parse the redirect URL, mount, then render the
//! session from its decoded tokens.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use smart_inspector::{
    ClientError, ClientSession, ClientState, LAUNCH_PARAMS_KEY, LaunchContext, LaunchQuery,
    LaunchResolver, MemorySessionStore, ResolutionOutcome, SessionStore, SessionSummary,
    SmartClient, TokenKind, TokenResponse, build_sim_aud, relative_phrase,
};

fn b64(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(value.to_string())
}

fn jwt(payload: Value) -> String {
    format!("{}.{}.signature", b64(&json!({"alg": "RS384"})), b64(&payload))
}

struct FixedSession(ClientState);

#[async_trait]
impl ClientSession for FixedSession {
    fn state(&self) -> &ClientState {
        &self.0
    }

    fn fhir_user(&self) -> Option<String> {
        Some("Practitioner/smart-Practitioner-71482713".to_string())
    }

    async fn request(&self, url: &str) -> Result<Value, ClientError> {
        Ok(json!({"resourceType": "Patient", "id": url.trim_start_matches("Patient/")}))
    }
}

struct FixedClient {
    state: ClientState,
    calls: AtomicUsize,
}

#[async_trait]
impl SmartClient for FixedClient {
    async fn ready(&self) -> Result<Arc<dyn ClientSession>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixedSession(self.state.clone())))
    }
}

fn client_with_tokens(token_response: TokenResponse) -> Arc<FixedClient> {
    Arc::new(FixedClient {
        state: ClientState {
            server_url: "https://launch.example.org/v/r4/fhir".into(),
            scope: "launch openid fhirUser".into(),
            client_id: "inspector".into(),
            token_response: Some(token_response),
            ..Default::default()
        },
        calls: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn ehr_launch_then_render_session() {
    let client = client_with_tokens(TokenResponse {
        access_token: Some(jwt(json!({"exp": 4_102_444_800_i64, "scope": "patient/*.read"}))),
        id_token: Some(jwt(json!({"sub": "u1"}))),
        patient: Some("123".into()),
        ..Default::default()
    });
    let store = Arc::new(MemorySessionStore::new());
    let resolver = LaunchResolver::new(client.clone(), store.clone());

    let code = jwt(json!({"launch_type": "provider-ehr", "patient": "123"}));
    let url = format!("https://app.example.org/?code={code}&state=abc");
    let outcome = resolver.mount(LaunchQuery::parse(&url)).await;

    let ResolutionOutcome::Ready(session) = outcome else {
        panic!("expected a ready session, got {outcome:?}");
    };
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);

    let cached: LaunchContext =
        serde_json::from_str(&store.get(LAUNCH_PARAMS_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(cached.launch_type(), Some("provider-ehr"));

    let patient = session.read_patient().await.unwrap();
    assert_eq!(patient["id"], "123");

    let summary = SessionSummary::from_state(session.state());
    let access = summary.token(TokenKind::Access).unwrap();
    assert_eq!(access.expires_at(), Some(4_102_444_800));
    assert!(relative_phrase(4_102_444_800, 4_102_444_800 - 45).ends_with("seconds"));
}

#[tokio::test]
async fn expired_claims_do_not_affect_resolution() {
    // Claims are display-only: an expired, scope-less token still yields Ready.
    let client = client_with_tokens(TokenResponse {
        access_token: Some(jwt(json!({"exp": 1, "scope": ""}))),
        ..Default::default()
    });
    let resolver = LaunchResolver::new(client, Arc::new(MemorySessionStore::new()));

    let outcome = resolver.mount(LaunchQuery::default()).await;
    let session = outcome.session().expect("session");

    let summary = SessionSummary::from_state(session.state());
    let access = summary.token(TokenKind::Access).unwrap();
    assert_eq!(access.expires_at(), Some(1));
    assert_eq!(relative_phrase(1, 61), "1 minute ago");
}

#[tokio::test]
async fn standalone_launch_uses_cached_context_on_reload() {
    let client = client_with_tokens(TokenResponse::default());
    let store = Arc::new(MemorySessionStore::new());
    let ctx = LaunchContext::with_patient("standalone-patient", "123").with("skip_auth", true);
    let aud = build_sim_aud("https://launch.example.org/v/r4", &ctx);

    let first = LaunchResolver::new(client.clone(), store.clone());
    let query = LaunchQuery::from_query(
        &url::form_urlencoded::Serializer::new(String::new())
            .append_pair("aud", &aud)
            .finish(),
    );
    let outcome = first.mount(query).await;
    assert!(matches!(outcome, ResolutionOutcome::ReadyStandalone(ref c) if *c == ctx));
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);

    // A reload in the same session sees the cached context before settling.
    let reloaded = LaunchResolver::new(client.clone(), store);
    assert_eq!(reloaded.fallback_context(), Some(ctx));
    assert!(!reloaded.outcome().is_settled());
}

#[tokio::test]
async fn oauth_error_redirect_is_denied() {
    let client = client_with_tokens(TokenResponse::default());
    let resolver = LaunchResolver::new(client.clone(), Arc::new(MemorySessionStore::new()));

    let outcome = resolver
        .mount(LaunchQuery::parse(
            "https://app.example.org/?error=access_denied&error_description=user%20refused&state=abc",
        ))
        .await;

    let err = outcome.error().expect("error outcome");
    assert!(err.is_terminal());
    assert_eq!(
        err.to_string(),
        "Authorization denied (access_denied): user refused"
    );
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}
