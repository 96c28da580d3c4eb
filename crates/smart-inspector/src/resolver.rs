//! Launch flow resolution.
//!
//! A SMART app can be reached in three ways, told apart purely by the query
//! parameters of the URL it was opened with:
//!
//! | condition                 | flow        | outcome                          |
//! |---------------------------|-------------|----------------------------------|
//! | `error` present           | denied      | `OAuthDenied`, no client request |
//! | `code` and `state`        | EHR launch  | `Ready` / `Failed`               |
//! | `aud` present             | standalone  | `ReadyStandalone` / `Failed`     |
//! | none of the above         | refresh     | `Ready` / `Failed`               |
//!
//! [`classify`] is a pure function from [`LaunchQuery`] to [`LaunchFlow`].
//! [`LaunchResolver`] performs the side effects (session storage writes and
//! the call to the external client) and publishes the current
//! [`ResolutionOutcome`].
//!
//! # Superseded acquisitions
//!
//! Every mount is tagged with a generation number. If the query changes while
//! an acquisition is still outstanding, the late result of the older
//! generation is discarded instead of overwriting the newer outcome.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::claims::decode_payload;
use crate::client::{ClientSession, SmartClient};
use crate::error::InspectorError;
use crate::launch::{LAUNCH_PARAMS_KEY, LaunchContext};
use crate::sim::{decode_sim, extract_sim_segment};
use crate::storage::{SessionStore, read_json, write_json};

/// Failure message for a standalone `aud` without a sim segment.
pub const MISSING_SIM_SEGMENT: &str = "Invalid aud parameter (missing sim segment)";

// ============================================================================
// Query parameters
// ============================================================================

/// The query parameters that decide the launch flow.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub aud: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl LaunchQuery {
    /// Reads the launch parameters from a URL's query string.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_pairs(url.query_pairs())
    }

    /// Reads the launch parameters from a bare query string (with or without
    /// the leading `?`).
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    /// Accepts either a full URL or a bare query string.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        match Url::parse(input) {
            Ok(url) => Self::from_url(&url),
            Err(_) => Self::from_query(input),
        }
    }

    fn from_pairs<'a>(
        pairs: impl Iterator<Item = (std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>)>,
    ) -> Self {
        let mut query = Self::default();
        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "code" => &mut query.code,
                "state" => &mut query.state,
                "aud" => &mut query.aud,
                "error" => &mut query.error,
                "error_description" => &mut query.error_description,
                _ => continue,
            };
            // First occurrence wins, like URLSearchParams.get().
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        query
    }
}

// ============================================================================
// Classification
// ============================================================================

/// The startup condition derived from the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchFlow {
    /// The authorization server redirected back with an error.
    Denied {
        error: String,
        description: Option<String>,
    },
    /// EHR launch completing: an authorization code came back.
    EhrLaunch { code: String },
    /// Standalone launch: the launch context is embedded in `aud`.
    Standalone { aud: String },
    /// Plain reload or return navigation.
    Refresh,
}

impl LaunchFlow {
    /// Short name for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Denied { .. } => "denied",
            Self::EhrLaunch { .. } => "ehr-launch",
            Self::Standalone { .. } => "standalone",
            Self::Refresh => "refresh",
        }
    }
}

/// Classifies a launch by its query parameters.
///
/// `error` wins over everything, then `code` + `state`, then `aud`.
#[must_use]
pub fn classify(query: &LaunchQuery) -> LaunchFlow {
    if let Some(error) = &query.error {
        return LaunchFlow::Denied {
            error: error.clone(),
            description: query.error_description.clone(),
        };
    }

    if let (Some(code), Some(_)) = (&query.code, &query.state) {
        return LaunchFlow::EhrLaunch { code: code.clone() };
    }

    if let Some(aud) = &query.aud {
        return LaunchFlow::Standalone { aud: aud.clone() };
    }

    LaunchFlow::Refresh
}

// ============================================================================
// Outcome
// ============================================================================

/// The current resolution state. Exactly one is current at any time.
#[derive(Clone)]
pub enum ResolutionOutcome {
    /// Initial state; holds until the selected flow settles.
    Loading,
    /// A live session is available.
    Ready(Arc<dyn ClientSession>),
    /// Standalone launch parameters were reconstructed; no session yet.
    ReadyStandalone(LaunchContext),
    /// Resolution failed; terminal for this mount.
    Failed(String),
    /// The authorization server reported an error.
    OAuthDenied {
        code: String,
        description: Option<String>,
    },
}

impl ResolutionOutcome {
    /// Returns true once the outcome is anything but `Loading`.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }

    #[must_use]
    pub fn session(&self) -> Option<&Arc<dyn ClientSession>> {
        match self {
            Self::Ready(session) => Some(session),
            _ => None,
        }
    }

    /// The error to render full-page, if this outcome is a failure.
    #[must_use]
    pub fn error(&self) -> Option<InspectorError> {
        match self {
            Self::Failed(message) => Some(InspectorError::resolution_failed(message.clone())),
            Self::OAuthDenied { code, description } => {
                Some(InspectorError::oauth_denied(code.clone(), description.clone()))
            }
            _ => None,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::ReadyStandalone(_) => "ready-standalone",
            Self::Failed(_) => "failed",
            Self::OAuthDenied { .. } => "oauth-denied",
        }
    }
}

impl fmt::Debug for ResolutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading"),
            Self::Ready(session) => f.debug_tuple("Ready").field(session).finish(),
            Self::ReadyStandalone(ctx) => f.debug_tuple("ReadyStandalone").field(ctx).finish(),
            Self::Failed(message) => f.debug_tuple("Failed").field(message).finish(),
            Self::OAuthDenied { code, description } => f
                .debug_struct("OAuthDenied")
                .field("code", code)
                .field("description", description)
                .finish(),
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Drives one launch from its query parameters to a settled outcome.
pub struct LaunchResolver {
    client: Arc<dyn SmartClient>,
    store: Arc<dyn SessionStore>,
    generation: AtomicU64,
    mounted: Mutex<Option<LaunchQuery>>,
    outcome: watch::Sender<ResolutionOutcome>,
}

impl LaunchResolver {
    #[must_use]
    pub fn new(client: Arc<dyn SmartClient>, store: Arc<dyn SessionStore>) -> Self {
        let (outcome, _rx) = watch::channel(ResolutionOutcome::Loading);
        Self {
            client,
            store,
            generation: AtomicU64::new(0),
            mounted: Mutex::new(None),
            outcome,
        }
    }

    /// Receiver that observes every outcome transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ResolutionOutcome> {
        self.outcome.subscribe()
    }

    /// The current outcome.
    #[must_use]
    pub fn outcome(&self) -> ResolutionOutcome {
        self.outcome.borrow().clone()
    }

    /// Launch context cached by an earlier mount in this session.
    ///
    /// Shown while a live session is still being acquired.
    #[must_use]
    pub fn fallback_context(&self) -> Option<LaunchContext> {
        match read_json(self.store.as_ref(), LAUNCH_PARAMS_KEY) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable cached launch context");
                None
            }
        }
    }

    /// Resolves the launch for `query`.
    ///
    /// Calling again with an identical query is a no-op that returns the
    /// current outcome. A different query starts a new generation; the
    /// returned outcome is whatever is current once this call's acquisition
    /// has settled (a newer generation may already have replaced it).
    pub async fn mount(&self, query: LaunchQuery) -> ResolutionOutcome {
        let generation = {
            let Ok(mut mounted) = self.mounted.lock() else {
                return self.settle_now(ResolutionOutcome::Failed(
                    "Resolver state lock poisoned".to_string(),
                ));
            };
            if mounted.as_ref() == Some(&query) {
                debug!("launch query unchanged, keeping current outcome");
                return self.outcome();
            }
            *mounted = Some(query.clone());
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.outcome.send_replace(ResolutionOutcome::Loading);
            generation
        };

        let flow = classify(&query);
        debug!(flow = flow.as_str(), generation, "classified launch");

        let result = self.acquire(flow).await;
        self.settle(generation, result)
    }

    async fn acquire(&self, flow: LaunchFlow) -> ResolutionOutcome {
        match flow {
            LaunchFlow::Denied { error, description } => ResolutionOutcome::OAuthDenied {
                code: error,
                description,
            },
            LaunchFlow::EhrLaunch { code } => {
                let context = match decode_payload(&code) {
                    Ok(map) => LaunchContext::from_map(map),
                    Err(e) => return ResolutionOutcome::Failed(format!("Invalid code parameter: {e}")),
                };
                if let Err(e) = self.persist(&context) {
                    return ResolutionOutcome::Failed(e.to_string());
                }
                self.request_session().await
            }
            LaunchFlow::Standalone { aud } => {
                let Some(payload) = extract_sim_segment(&aud) else {
                    return ResolutionOutcome::Failed(MISSING_SIM_SEGMENT.to_string());
                };
                let context = match decode_sim(payload) {
                    Ok(ctx) => ctx,
                    Err(e) => return ResolutionOutcome::Failed(e.to_string()),
                };
                if let Err(e) = self.persist(&context) {
                    return ResolutionOutcome::Failed(e.to_string());
                }
                ResolutionOutcome::ReadyStandalone(context)
            }
            LaunchFlow::Refresh => self.request_session().await,
        }
    }

    async fn request_session(&self) -> ResolutionOutcome {
        match self.client.ready().await {
            Ok(session) => ResolutionOutcome::Ready(session),
            Err(e) => ResolutionOutcome::Failed(e.to_string()),
        }
    }

    fn persist(&self, context: &LaunchContext) -> Result<(), InspectorError> {
        write_json(self.store.as_ref(), LAUNCH_PARAMS_KEY, context)?;
        Ok(())
    }

    fn settle(&self, generation: u64, outcome: ResolutionOutcome) -> ResolutionOutcome {
        let current = self.generation.load(Ordering::SeqCst);
        if generation != current {
            warn!(
                generation,
                current,
                outcome = outcome.as_str(),
                "discarding result of superseded launch resolution"
            );
            return self.outcome();
        }
        self.settle_now(outcome)
    }

    fn settle_now(&self, outcome: ResolutionOutcome) -> ResolutionOutcome {
        match &outcome {
            ResolutionOutcome::Failed(message) => warn!(%message, "launch resolution failed"),
            ResolutionOutcome::OAuthDenied { code, .. } => {
                warn!(%code, "authorization server denied the launch")
            }
            other => info!(outcome = other.as_str(), "launch resolved"),
        }
        self.outcome.send_replace(outcome.clone());
        outcome
    }
}

impl fmt::Debug for LaunchResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchResolver")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("outcome", &self.outcome())
            .finish_non_exhaustive()
    }
}
