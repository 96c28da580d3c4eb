use anyhow::{Context as _, Result};
use serde_json::{Map, Value};
use smart_inspector::{LaunchContext, build_sim_aud, decode_sim, encode_sim, extract_sim_segment};

use super::{Context, arg_or_stdin};
use crate::cli::SimCommands;
use crate::output::print_value;

pub fn sim(ctx: &Context, command: &SimCommands) -> Result<()> {
    match command {
        SimCommands::Encode { json } => {
            let context = parse_context(&arg_or_stdin(json.as_deref(), "launch context")?)?;
            println!("{}", encode_sim(&context));
        }
        SimCommands::Decode { input } => {
            let context = decode_input(input)?;
            print_value(&Value::Object(context.into_map()), ctx.format);
        }
        SimCommands::Aud { base, json } => {
            let context = parse_context(&arg_or_stdin(json.as_deref(), "launch context")?)?;
            println!("{}", build_sim_aud(base, &context));
        }
    }
    Ok(())
}

fn parse_context(raw: &str) -> Result<LaunchContext> {
    let map: Map<String, Value> =
        serde_json::from_str(raw).context("Launch context must be a JSON object")?;
    Ok(LaunchContext::from_map(map))
}

/// Accepts a bare payload or an audience URL containing `/sim/<payload>/`.
fn decode_input(input: &str) -> Result<LaunchContext> {
    let payload = if input.contains("://") {
        extract_sim_segment(input)
            .with_context(|| format!("No sim segment in {input}"))?
    } else {
        input.trim()
    };
    Ok(decode_sim(payload)?)
}
