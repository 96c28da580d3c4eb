mod cli;
mod client;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands, ConfigCommands};
use commands::Context;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let profile_name = &cli.profile;

    // Profile config is managed before anything else is loaded, so a broken
    // inspector config can still be inspected and fixed.
    if let Commands::Config(args) = &cli.command {
        return config_command(profile_name, &args.command);
    }

    let profile = config::load_profile(profile_name)?;
    let inspector = config::load_inspector(cli.config.as_deref(), cli.session.as_deref())?;
    observability::init_tracing_with_level(&inspector.log_level);

    let ctx = Context {
        format: cli.format.unwrap_or_else(|| profile.output_format()),
        server: config::resolve_server(&cli.server, &profile),
        profile,
        inspector,
    };

    match &cli.command {
        Commands::Resolve(args) => commands::resolve::resolve(&ctx, args).await?,
        Commands::Session(args) => commands::resolve::session(&ctx, !args.no_fetch).await?,
        Commands::Decode(args) => commands::decode::decode(&ctx, args)?,
        Commands::Countdown(args) => commands::countdown::countdown(&ctx, args).await?,
        Commands::Sim(args) => commands::sim::sim(&ctx, &args.command)?,
        Commands::Clear => commands::session::clear(&ctx)?,
        Commands::Config(args) => config_command(profile_name, &args.command)?,
    }

    Ok(())
}

fn config_command(profile_name: &str, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let cfg = config::load_profile(profile_name)?;
            let unset = "(not set)";
            println!("{}: {}", "Profile".cyan(), profile_name);
            println!("{}: {}", "Server".cyan(), cfg.server.as_deref().unwrap_or(unset));
            println!(
                "{}: {}",
                "Client ID".cyan(),
                cfg.client_id.as_deref().unwrap_or(unset)
            );
            println!(
                "{}: {}",
                "Redirect URI".cyan(),
                cfg.redirect_uri.as_deref().unwrap_or(unset)
            );
            println!("{}: {}", "Scope".cyan(), cfg.scope.as_deref().unwrap_or(unset));
            println!(
                "{}: {}",
                "Format".cyan(),
                cfg.format.as_deref().unwrap_or("table")
            );
        }
        ConfigCommands::Set(set_args) => {
            let mut cfg = config::load_profile(profile_name)?;
            cfg.set(&set_args.key, &set_args.value)?;
            config::save_profile(profile_name, &cfg)?;
            output::print_success(&format!("Set {} = {}", set_args.key, set_args.value));
        }
    }
    Ok(())
}
