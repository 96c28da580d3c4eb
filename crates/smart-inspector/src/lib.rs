//! # smart-inspector
//!
//! Client-side core for inspecting SMART on FHIR launches.
//!
//! This crate provides:
//! - Classification of the three ways a launch reaches an app (EHR launch,
//!   standalone launch, silent refresh) and resolution into a live session
//! - Unverified decoding of JWT-shaped tokens for display
//! - The compact "sim" launch-context codec used in standalone `aud` URLs
//! - Live "expires in / ago" countdowns
//!
//! ## Trust
//!
//! Nothing in this crate verifies a token signature. Decoded claims are
//! informational and must never drive an authorization decision.
//!
//! ## Modules
//!
//! - [`resolver`] - Launch flow classification and session acquisition
//! - [`claims`] - Base64url/JSON decoding of token segments
//! - [`sim`] - Sim-parameter codec for standalone audience URLs
//! - [`countdown`] - Relative expiry phrases and the ticking countdown
//! - [`launch`] - Launch context data model
//! - [`client`] - Contract of the external SMART client
//! - [`storage`] - Session-scoped key/value storage
//! - [`inspect`] - Read-only token views for presenters
//! - [`config`] - Runtime configuration
//! - [`error`] - Error taxonomy

pub mod claims;
pub mod client;
pub mod config;
pub mod countdown;
pub mod error;
pub mod inspect;
pub mod launch;
pub mod resolver;
pub mod sim;
pub mod storage;

pub use claims::{ClaimsError, TokenClaims, decode_claims, decode_payload};
pub use client::{ClientError, ClientSession, ClientState, SmartClient, TokenResponse};
pub use config::{ConfigError, InspectorConfig, StorageBackend, StorageConfig};
pub use countdown::{Clock, Countdown, DEFAULT_TICK, SystemClock, relative_phrase};
pub use error::{ErrorCategory, InspectorError};
pub use inspect::{SessionSummary, TokenKind, TokenView};
pub use launch::{LAUNCH_PARAMS_KEY, LaunchContext};
pub use resolver::{
    LaunchFlow, LaunchQuery, LaunchResolver, MISSING_SIM_SEGMENT, ResolutionOutcome, classify,
};
pub use sim::{SimError, build_sim_aud, decode_sim, encode_sim, extract_sim_segment};
pub use storage::{FileSessionStore, MemorySessionStore, SessionStore, StorageError};

/// Type alias for inspector results.
pub type InspectorResult<T> = Result<T, InspectorError>;
