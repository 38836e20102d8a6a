mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./mediafetch.toml",
        "~/.config/mediafetch/config.toml",
        "/etc/mediafetch/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.pool.queue_depth == 0 {
        anyhow::bail!("Pool queue depth cannot be 0");
    }

    if config.resolver.ttl_secs == 0 {
        anyhow::bail!("Resolver TTL cannot be 0");
    }

    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("Fetch timeout cannot be 0");
    }

    if config.fetch.max_body_bytes == 0 {
        anyhow::bail!("Fetch body limit cannot be 0");
    }

    if let Some(dir) = &config.cache.dir {
        if dir.exists() && !dir.is_dir() {
            anyhow::bail!("Cache path {:?} exists but is not a directory", dir);
        }
    }

    for dir in [&config.resolver.temp_dir, &config.resolver.local_dir]
        .into_iter()
        .flatten()
    {
        if !dir.exists() {
            tracing::warn!("Resolver directory does not exist: {:?}", dir);
        }
    }

    Ok(())
}
