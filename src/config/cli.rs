use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the docvault binary.
#[derive(Debug, Parser)]
#[command(
    name = "docvault",
    version,
    about = "Document collection persistence core"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DOCVAULT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Connect to the durable store, run startup hooks and probe health.
    Check(CheckArgs),
    /// Recompute the derived document and collection counters.
    Recount(RecountArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Check(CheckArgs::default())
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RecountArgs {
    #[command(flatten)]
    pub overrides: Overrides,

    /// Only recount this collection and its documents.
    #[arg(long = "collection", value_name = "ID")]
    pub collection: Option<i64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL (`memory://` for the in-process store).
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the entity cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the entity cache capacity.
    #[arg(long = "cache-capacity", value_name = "ENTRIES")]
    pub cache_capacity: Option<u64>,

    /// Override the entity cache TTL; 0 disables expiry.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Replace the enabled extension list (comma separated).
    #[arg(long = "extensions", value_name = "NAMES", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,
}

impl Command {
    pub fn overrides(&self) -> &Overrides {
        match self {
            Command::Check(args) => &args.overrides,
            Command::Recount(args) => &args.overrides,
        }
    }
}
