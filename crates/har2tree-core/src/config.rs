use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/har2tree/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Har2TreeConfig {
    /// Whether the HTML resource extractor runs its full-text URL regex
    /// fallback (§4.2), in addition to the tag/attribute and CSS/JS passes.
    pub full_text_search: bool,
}

impl Default for Har2TreeConfig {
    fn default() -> Self {
        Self {
            full_text_search: true,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("har2tree")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<Har2TreeConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = Har2TreeConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: Har2TreeConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Har2TreeConfig::default();
        assert!(cfg.full_text_search);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = Har2TreeConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Har2TreeConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.full_text_search, cfg.full_text_search);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = "full_text_search = false\n";
        let cfg: Har2TreeConfig = toml::from_str(toml).unwrap();
        assert!(!cfg.full_text_search);
    }
}
