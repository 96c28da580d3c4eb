use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "smart-inspector")]
#[command(about = "Inspect SMART on FHIR launches, tokens and sessions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// FHIR server base URL used when no session state exists yet
    #[arg(short, long, global = true, env = "SMART_INSPECTOR_SERVER")]
    pub server: Option<String>,

    /// Config profile name
    #[arg(
        short,
        long,
        global = true,
        env = "SMART_INSPECTOR_PROFILE",
        default_value = "default"
    )]
    pub profile: String,

    /// Session id; values cached by one command are visible to the next
    /// command of the same session
    #[arg(long, global = true, env = "SMART_INSPECTOR_SESSION")]
    pub session: Option<String>,

    /// Path to an inspector TOML config file
    #[arg(long, global = true, env = "SMART_INSPECTOR_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the URL the app was opened with (EHR launch, standalone, refresh)
    Resolve(ResolveArgs),
    /// Show the current session: tokens, claims, expiry and context resources
    Session(SessionArgs),
    /// Decode a JWT-shaped token (no signature check)
    Decode(DecodeArgs),
    /// Live "expires in / ago" countdown for a Unix timestamp
    Countdown(CountdownArgs),
    /// Encode or decode standalone-launch sim parameters
    Sim(SimArgs),
    /// Forget everything cached for the current session
    Clear,
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct ResolveArgs {
    /// Full redirect URL or bare query string (e.g. "?code=...&state=...")
    pub url: String,
    /// Skip patient/encounter/user/metadata fetches after a successful launch
    #[arg(long)]
    pub no_fetch: bool,
}

#[derive(clap::Args)]
pub struct SessionArgs {
    /// Skip patient/encounter/user/metadata fetches
    #[arg(long)]
    pub no_fetch: bool,
}

#[derive(clap::Args)]
pub struct DecodeArgs {
    /// Token string (reads from stdin if omitted)
    pub token: Option<String>,
}

#[derive(clap::Args)]
pub struct CountdownArgs {
    /// Expiry as Unix seconds
    pub exp: i64,
    /// Stop after this many updates (runs until Ctrl-C if omitted)
    #[arg(long)]
    pub updates: Option<u32>,
}

#[derive(clap::Args)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommands,
}

#[derive(Subcommand)]
pub enum SimCommands {
    /// Encode a launch context JSON object into a sim payload
    Encode {
        /// JSON object (reads from stdin if omitted)
        json: Option<String>,
    },
    /// Decode a sim payload, or the sim segment of an `aud` URL
    Decode {
        /// Payload or full audience URL
        input: String,
    },
    /// Build a standalone-launch audience URL
    Aud {
        /// Launcher base URL (e.g. https://launch.smarthealthit.org/v/r4)
        #[arg(long)]
        base: String,
        /// JSON object (reads from stdin if omitted)
        json: Option<String>,
    },
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (server, client_id, redirect_uri, scope, format)
    pub key: String,
    /// Value
    pub value: String,
}
