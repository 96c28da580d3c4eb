use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use smart_inspector::{LaunchContext, LaunchFlow, LaunchQuery, LaunchResolver, ResolutionOutcome, classify};
use tracing::debug;

use super::Context;
use super::session::{self, SessionReport};
use crate::cli::ResolveArgs;
use crate::output::{print_field, print_heading, print_json, print_value, print_warning};

/// Resolves the URL the app was opened with.
pub async fn resolve(ctx: &Context, args: &ResolveArgs) -> Result<()> {
    launch(ctx, LaunchQuery::parse(&args.url), !args.no_fetch).await
}

/// Re-opens the current session (silent refresh flow).
pub async fn session(ctx: &Context, fetch: bool) -> Result<()> {
    launch(ctx, LaunchQuery::default(), fetch).await
}

async fn launch(ctx: &Context, query: LaunchQuery, fetch: bool) -> Result<()> {
    let flow = classify(&query);
    let code = match &flow {
        LaunchFlow::EhrLaunch { code } => Some(code.clone()),
        _ => None,
    };
    debug!(flow = flow.as_str(), "resolving launch");

    let store = ctx.store()?;
    let client = ctx
        .http_client(store.clone())?
        .with_code(code)
        .with_seed(ctx.seed_state());
    let resolver = LaunchResolver::new(Arc::new(client), store);

    let cached = resolver.fallback_context();
    if !ctx.is_json() {
        print_field("Flow", flow.as_str());
        if let Some(cached) = &cached {
            print_heading("Cached launch context");
            print_context(cached, ctx);
        }
    }

    match resolver.mount(query).await {
        ResolutionOutcome::Ready(client) => {
            let report = SessionReport::collect(client.as_ref(), fetch).await;
            if ctx.is_json() {
                let mut out = report.to_json();
                out["flow"] = json!(flow.as_str());
                out["launchContext"] = context_json(resolver.fallback_context().as_ref());
                print_json(&out);
            } else {
                session::render(&report, ctx.inspector.countdown_tick);
            }
            Ok(())
        }
        ResolutionOutcome::ReadyStandalone(context) => {
            if ctx.is_json() {
                print_json(&json!({
                    "flow": flow.as_str(),
                    "launchContext": context_json(Some(&context)),
                }));
            } else {
                print_heading("Standalone launch context");
                print_context(&context, ctx);
            }
            Ok(())
        }
        outcome => match outcome.error() {
            Some(err) => Err(err.into()),
            None => anyhow::bail!("Launch resolution did not settle"),
        },
    }
}

fn context_json(context: Option<&LaunchContext>) -> Value {
    context.map_or(Value::Null, |c| Value::Object(c.as_map().clone()))
}

fn print_context(context: &LaunchContext, ctx: &Context) {
    if let Some(error) = context.sim_error() {
        print_warning(&format!("Launcher will simulate error: {error}"));
    }
    print_value(&Value::Object(context.as_map().clone()), ctx.format);
}
