use anyhow::Result;
use serde_json::json;
use smart_inspector::{Clock, InspectorError, SystemClock, decode_claims, relative_phrase};

use super::{Context, arg_or_stdin, expiry_label};
use crate::cli::DecodeArgs;
use crate::output::{display_value, print_field, print_heading, print_json, print_table};

/// Decodes a token's header and payload without verifying it.
pub fn decode(ctx: &Context, args: &DecodeArgs) -> Result<()> {
    let token = arg_or_stdin(args.token.as_deref(), "token")?;
    let claims = decode_claims(&token).map_err(InspectorError::from)?;

    if ctx.is_json() {
        print_json(&json!(claims));
        return Ok(());
    }

    let now = SystemClock.now_unix();
    if let Some(alg) = claims.algorithm() {
        print_field("Algorithm", alg);
    }
    if let Some(exp) = claims.expires_at() {
        print_field("Expiry", &expiry_label(&relative_phrase(exp, now)));
    }
    if let Some(iat) = claims.issued_at() {
        print_field("Issued", &relative_phrase(iat, now));
    }
    print_field("Signature", "not verified");

    print_heading("Header");
    print_table(
        ["Claim", "Value"],
        claims.header.iter().map(|(k, v)| (k.clone(), display_value(v))),
    );
    print_heading("Payload");
    print_table(
        ["Claim", "Value"],
        claims.payload.iter().map(|(k, v)| (k.clone(), display_value(v))),
    );
    Ok(())
}
