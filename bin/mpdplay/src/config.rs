use std::path::Path;

use anyhow::Context;
use mpdplan::PlayerConfig;

pub fn load(path: Option<&Path>) -> anyhow::Result<PlayerConfig> {
    let Some(path) = path else {
        return Ok(PlayerConfig::default());
    };

    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = toml::from_str(&data)
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}
