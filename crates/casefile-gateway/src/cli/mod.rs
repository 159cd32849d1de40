pub mod doctor;

use clap::{Parser, Subcommand};

/// casefile-gateway — session manager + SSE event bridge for an AI
/// investigation platform.
#[derive(Debug, Parser)]
#[command(name = "casefile-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
}

/// Load the configuration from the path specified by `CASEFILE_CONFIG`
/// (or `config.toml` by default), then overlay it with the environment
/// variables enumerated in spec §6.4 (mirrors the reference gateway's
/// `load_config`, which only reads the file — here the overlay step is
/// folded into loading since every caller needs it applied).
pub fn load_config() -> anyhow::Result<(casefile_domain::config::Config, String, Vec<casefile_domain::config::ConfigIssue>)> {
    let config_path =
        std::env::var("CASEFILE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        casefile_domain::config::Config::default()
    };

    let mut issues = Vec::new();
    config.apply_env(&mut issues);

    Ok((config, config_path, issues))
}
