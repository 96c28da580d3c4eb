use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use serde_json::{Value, json};
use smart_inspector::{
    ClientError, ClientSession, InspectorError, LAUNCH_PARAMS_KEY, SessionSummary, TokenView,
};

use super::{Context, expiry_label};
use crate::client::SMART_STATE_KEY;
use crate::output::{
    abbreviate, display_value, print_field, print_heading, print_success, print_table,
    print_warning,
};

/// A context resource panel: the fetched resource or its local error.
pub struct Panel {
    pub title: &'static str,
    pub result: Result<Value, InspectorError>,
}

/// Everything the session view shows.
pub struct SessionReport {
    pub summary: SessionSummary,
    pub fhir_user: Option<String>,
    pub panels: Vec<Panel>,
}

impl SessionReport {
    /// Builds the report; with `fetch`, loads the context resources
    /// concurrently. Each resource failure stays local to its panel.
    pub async fn collect(session: &dyn ClientSession, fetch: bool) -> Self {
        let summary = SessionSummary::from_state(session.state());
        let fhir_user = session.fhir_user();

        let panels = if fetch {
            let user = async {
                match &fhir_user {
                    Some(url) => session.request(url).await,
                    None => Err(ClientError::MissingContext("fhirUser")),
                }
            };
            let (patient, encounter, user, metadata) = tokio::join!(
                session.read_patient(),
                session.read_encounter(),
                user,
                session.request("metadata"),
            );
            vec![
                panel("Patient", patient),
                panel("Encounter", encounter),
                panel("User", user),
                panel("Server metadata", metadata),
            ]
        } else {
            Vec::new()
        };

        Self {
            summary,
            fhir_user,
            panels,
        }
    }

    pub fn to_json(&self) -> Value {
        let s = &self.summary;
        let tokens: Vec<Value> = s.tokens.iter().map(token_json).collect();
        let panels: serde_json::Map<String, Value> = self
            .panels
            .iter()
            .map(|p| {
                let value = match &p.result {
                    Ok(resource) => json!({ "resource": resource }),
                    Err(e) => json!({ "error": e.to_string() }),
                };
                (p.title.to_string(), value)
            })
            .collect();

        json!({
            "serverUrl": s.server_url,
            "clientId": s.client_id,
            "scopes": s.scopes,
            "pkce": s.uses_pkce,
            "patient": s.patient,
            "encounter": s.encounter,
            "expiresAt": s.expires_at,
            "fhirUser": self.fhir_user,
            "tokens": tokens,
            "resources": panels,
        })
    }
}

fn panel(title: &'static str, result: Result<Value, ClientError>) -> Panel {
    Panel {
        title,
        result: result.map_err(|e| InspectorError::resource_fetch_failed(title, e.to_string())),
    }
}

fn token_json(view: &TokenView) -> Value {
    let mut out = json!({
        "kind": view.kind,
        "raw": view.raw,
        "expiresAt": view.expires_at(),
        "issuedAt": view.issued_at(),
    });
    match view.claims() {
        Ok(claims) => out["claims"] = json!(claims),
        Err(e) => out["error"] = json!(e.to_string()),
    }
    out
}

pub fn render(report: &SessionReport, tick: Duration) {
    let s = &report.summary;
    print_heading("Session");
    print_field("Server", &s.server_url);
    print_field("Client ID", or_dash(Some(s.client_id.as_str()).filter(|c| !c.is_empty())));
    print_field("PKCE", if s.uses_pkce { "yes" } else { "no" });
    print_field("Patient", or_dash(s.patient.as_deref()));
    print_field("Encounter", or_dash(s.encounter.as_deref()));
    print_field("User", or_dash(report.fhir_user.as_deref()));

    print_heading("Scopes");
    if s.scopes.is_empty() {
        println!("  (none)");
    }
    for scope in &s.scopes {
        println!("  {scope}");
    }

    for view in &s.tokens {
        render_token(view, tick);
    }

    for p in &report.panels {
        print_heading(p.title);
        match &p.result {
            Ok(resource) => print_table(["Field", "Value"], describe_resource(resource)),
            Err(e) => print_warning(&e.to_string()),
        }
    }
}

fn render_token(view: &TokenView, tick: Duration) {
    print_heading(&view.kind.to_string());
    print_field("Raw", &abbreviate(&view.raw, 16));

    let claims = match view.claims() {
        Ok(claims) => claims,
        Err(e) => {
            print_warning(&e.to_string());
            return;
        }
    };
    if let Some(countdown) = view.countdown_with(tick) {
        let label = expiry_label(&countdown.phrase());
        let label = if label.starts_with("expired") {
            label.red()
        } else {
            label.green()
        };
        print_field("Expiry", &label.to_string());
    }
    println!("{}", "Header".dimmed());
    print_table(
        ["Claim", "Value"],
        claims.header.iter().map(|(k, v)| (k.clone(), display_value(v))),
    );
    println!("{}", "Payload".dimmed());
    print_table(
        ["Claim", "Value"],
        claims.payload.iter().map(|(k, v)| (k.clone(), display_value(v))),
    );
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Headline fields of a FHIR resource for the panel tables.
pub fn describe_resource(resource: &Value) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    let mut push = |label: &str, value: Option<String>| {
        if let Some(value) = value {
            rows.push((label.to_string(), value));
        }
    };
    let str_at = |key: &str| resource.get(key).and_then(Value::as_str).map(str::to_string);

    push("resourceType", str_at("resourceType"));
    push("id", str_at("id"));
    push("name", human_name(resource));
    push("gender", str_at("gender"));
    push("birthDate", str_at("birthDate"));
    push("status", str_at("status"));
    push("fhirVersion", str_at("fhirVersion"));
    push(
        "software",
        resource.get("software").map(|s| {
            let name = s.get("name").and_then(Value::as_str).unwrap_or("unknown");
            match s.get("version").and_then(Value::as_str) {
                Some(version) => format!("{name} {version}"),
                None => name.to_string(),
            }
        }),
    );
    rows
}

fn human_name(resource: &Value) -> Option<String> {
    let name = resource.get("name")?.as_array()?.first()?;
    if let Some(text) = name.get("text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let mut parts: Vec<&str> = name
        .get("given")
        .and_then(Value::as_array)
        .map(|given| given.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if let Some(family) = name.get("family").and_then(Value::as_str) {
        parts.push(family);
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Forgets the cached launch context and client state of the session.
pub fn clear(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    store.remove(LAUNCH_PARAMS_KEY)?;
    store.remove(SMART_STATE_KEY)?;
    print_success(&format!(
        "Cleared session '{}'",
        ctx.inspector.storage.session_id
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use async_trait::async_trait;
    use smart_inspector::{ClientState, TokenResponse};

    struct CannedSession(ClientState);

    #[async_trait]
    impl ClientSession for CannedSession {
        fn state(&self) -> &ClientState {
            &self.0
        }

        fn fhir_user(&self) -> Option<String> {
            None
        }

        async fn request(&self, url: &str) -> Result<Value, ClientError> {
            match url {
                "Patient/123" => Ok(json!({
                    "resourceType": "Patient",
                    "id": "123",
                    "name": [{"given": ["Ada", "M"], "family": "Lovelace"}]
                })),
                _ => Err(ClientError::Http {
                    status: 500,
                    message: "boom".into(),
                }),
            }
        }
    }

    fn canned() -> CannedSession {
        CannedSession(ClientState {
            server_url: "https://fhir.example.org".into(),
            scope: "launch patient/*.read".into(),
            token_response: Some(TokenResponse {
                access_token: Some("opaque".into()),
                patient: Some("123".into()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_panel_errors_stay_local() {
        let report = SessionReport::collect(&canned(), true).await;
        let titles: Vec<&str> = report.panels.iter().map(|p| p.title).collect();
        assert_eq!(titles, ["Patient", "Encounter", "User", "Server metadata"]);

        assert!(report.panels[0].result.is_ok());
        let encounter = report.panels[1].result.as_ref().unwrap_err();
        assert!(encounter.is_local());
        assert_eq!(
            encounter.to_string(),
            "Failed to load Encounter: No encounter in the current launch context"
        );
        assert_eq!(
            report.panels[3].result.as_ref().unwrap_err().to_string(),
            "Failed to load Server metadata: HTTP 500: boom"
        );
    }

    #[tokio::test]
    async fn test_report_json() {
        let report = SessionReport::collect(&canned(), false).await;
        assert!(report.panels.is_empty());
        assert_json_include!(
            actual: report.to_json(),
            expected: json!({
                "serverUrl": "https://fhir.example.org",
                "scopes": ["launch", "patient/*.read"],
                "patient": "123",
                "tokens": [{"kind": "access", "raw": "opaque"}]
            })
        );
    }

    #[test]
    fn test_describe_resource() {
        let rows = describe_resource(&json!({
            "resourceType": "Patient",
            "id": "123",
            "name": [{"given": ["Ada"], "family": "Lovelace"}],
            "gender": "female"
        }));
        assert_eq!(
            rows,
            vec![
                ("resourceType".to_string(), "Patient".to_string()),
                ("id".to_string(), "123".to_string()),
                ("name".to_string(), "Ada Lovelace".to_string()),
                ("gender".to_string(), "female".to_string()),
            ]
        );

        let rows = describe_resource(&json!({
            "resourceType": "CapabilityStatement",
            "fhirVersion": "4.0.1",
            "software": {"name": "Server", "version": "1.2"}
        }));
        assert!(rows.contains(&("software".to_string(), "Server 1.2".to_string())));
    }
}
