pub mod countdown;
pub mod decode;
pub mod resolve;
pub mod session;
pub mod sim;

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use smart_inspector::{ClientState, InspectorConfig, SessionStore};

use crate::cli::OutputFormat;
use crate::client::HttpSmartClient;
use crate::config::ProfileConfig;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub format: OutputFormat,
    pub server: Option<String>,
    pub profile: ProfileConfig,
    pub inspector: InspectorConfig,
}

impl Context {
    pub fn store(&self) -> Result<Arc<dyn SessionStore>> {
        crate::config::open_store(&self.inspector)
    }

    pub fn http_client(&self, store: Arc<dyn SessionStore>) -> Result<HttpSmartClient> {
        HttpSmartClient::new(store, self.inspector.http_timeout)
            .context("Failed to build HTTP client")
    }

    /// Client state for a session that has none stored yet.
    pub fn seed_state(&self) -> Option<ClientState> {
        let server = self.server.as_ref()?;
        Some(ClientState {
            server_url: server.clone(),
            client_id: self.profile.client_id.clone().unwrap_or_default(),
            scope: self.profile.scope.clone().unwrap_or_default(),
            redirect_uri: self.profile.redirect_uri.clone(),
            ..Default::default()
        })
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}

/// Returns `arg`, or all of stdin trimmed when absent.
pub fn arg_or_stdin(arg: Option<&str>, what: &str) -> Result<String> {
    if let Some(value) = arg {
        return Ok(value.trim().to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .with_context(|| format!("Failed to read {what} from stdin"))?;
    let buf = buf.trim().to_string();
    if buf.is_empty() {
        anyhow::bail!("No {what} given");
    }
    Ok(buf)
}

/// "expires in 5 minutes" / "expired 5 minutes ago".
pub fn expiry_label(phrase: &str) -> String {
    if phrase.ends_with(" ago") {
        format!("expired {phrase}")
    } else {
        format!("expires {phrase}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_label() {
        assert_eq!(expiry_label("in 5 minutes"), "expires in 5 minutes");
        assert_eq!(expiry_label("2 days ago"), "expired 2 days ago");
        assert_eq!(expiry_label("now"), "expires now");
    }

    #[test]
    fn test_seed_state_requires_server() {
        let mut ctx = Context {
            format: OutputFormat::Table,
            server: None,
            profile: ProfileConfig {
                client_id: Some("inspector".into()),
                ..Default::default()
            },
            inspector: InspectorConfig::default(),
        };
        assert!(ctx.seed_state().is_none());

        ctx.server = Some("https://fhir.example.org".into());
        let seed = ctx.seed_state().unwrap();
        assert_eq!(seed.server_url, "https://fhir.example.org");
        assert_eq!(seed.client_id, "inspector");
        assert!(seed.token_response.is_none());
    }
}
