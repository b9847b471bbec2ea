//! `gridparley config` — Configuration management commands.

use gridparley_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

/// Print the effective configuration with secrets masked.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", render_redacted(&config)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

/// Write the default configuration unless one already exists.
pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() && !force {
        println!("   ⚠️  {} already exists (use --force to overwrite)", config_path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("   ✅ Wrote {}", config_path.display());
    println!("   Set GRIDPARLEY_API_KEY (or add api_key to the file) before `gridparley run`.");
    Ok(())
}

fn render_redacted(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some(REDACTED.into());
    }
    for provider in shown.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    toml::to_string_pretty(&shown)
}
