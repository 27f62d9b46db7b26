//! Config command handler
//!
//! View and modify configuration settings.

use crate::config::Config;
use crate::error::{Error, Result};
use clap::Args;

/// Config command arguments
#[derive(Args)]
pub struct ConfigArgs {
    /// Configuration key (e.g., "grid.precision")
    pub key: Option<String>,

    /// Value to set (if not provided, shows current value)
    pub value: Option<String>,

    /// Show config file path
    #[arg(long)]
    pub path: bool,

    /// Reset config to defaults
    #[arg(long)]
    pub reset: bool,
}

/// Run the config command
pub fn run(args: ConfigArgs) -> Result<()> {
    if args.path {
        let path = Config::config_path()?;
        println!("{}", path.display());
        return Ok(());
    }

    if args.reset {
        let config = Config::default();
        config.save()?;
        println!("Configuration reset to defaults");
        return Ok(());
    }

    let mut config = Config::load()?;

    match (&args.key, &args.value) {
        (None, None) => {
            print!("{}", render_config(&config));
        }

        (Some(key), None) => match config.get(key) {
            Some(value) => println!("{}", value),
            None => {
                return Err(Error::Config(format!(
                    "Unknown config key: {} (available: {})",
                    key,
                    Config::available_keys().join(", ")
                )));
            }
        },

        (Some(key), Some(value)) => {
            config.set(key, value)?;
            config.save()?;
            println!("{} = {}", key, value);
        }

        (None, Some(_)) => {
            return Err(Error::Config(
                "Must specify a key to set a value".to_string(),
            ));
        }
    }

    Ok(())
}

/// Render all configuration values in TOML layout
fn render_config(config: &Config) -> String {
    let mut out = String::new();

    out.push_str("[grid]\n");
    out.push_str(&format!("precision = {}\n\n", config.grid.precision));

    out.push_str("[neighborhood]\n");
    out.push_str(&format!("half_width = {}\n", config.neighborhood.half_width));
    out.push_str(&format!("sigma = {}\n\n", config.neighborhood.sigma));

    out.push_str("[server]\n");
    out.push_str(&format!("host = \"{}\"\n", config.server.host));
    out.push_str(&format!("port = {}\n\n", config.server.port));

    out.push_str("[storage]\n");
    match &config.storage.snapshot_path {
        Some(path) => out.push_str(&format!("snapshot_path = \"{}\"\n", path)),
        None => out.push_str("# snapshot_path = \"\" # default data directory\n"),
    }
    out.push_str(&format!(
        "snapshot_interval_secs = {}\n\n",
        config.storage.snapshot_interval_secs
    ));

    out.push_str("[output]\n");
    out.push_str(&format!("format = \"{}\"\n", config.output.format));

    out
}
