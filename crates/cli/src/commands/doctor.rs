//! `gridparley doctor` — Diagnose configuration and connectivity.

use gridparley_config::AppConfig;
use gridparley_providers::build_for_model;
use gridparley_providers::router::provider_key;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 GridParley Doctor — System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ⚠️  No config file, using defaults (run `gridparley config init`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    match config.model_spec() {
        Ok(spec) => {
            println!(
                "  ✅ Model {} ({}, {} token context)",
                spec.id, spec.family, spec.context_limit
            );
            let provider = provider_key(spec.family);
            if config.api_key_for(provider).is_some() {
                println!("  ✅ API key configured for {provider}");
                match build_for_model(&config, &spec).health_check().await {
                    Ok(true) => println!("  ✅ {provider} endpoint reachable"),
                    Ok(false) => {
                        println!("  ❌ {provider} endpoint rejected the health check");
                        issues += 1;
                    }
                    Err(e) => {
                        println!("  ❌ {provider} endpoint unreachable: {e}");
                        issues += 1;
                    }
                }
            } else {
                println!("  ⚠️  No API key for {provider}; set GRIDPARLEY_API_KEY");
                issues += 1;
            }
        }
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    match std::fs::create_dir_all(&config.output_dir) {
        Ok(()) => println!("  ✅ Output directory {} writable", config.output_dir.display()),
        Err(e) => {
            println!(
                "  ❌ Output directory {} unusable: {e}",
                config.output_dir.display()
            );
            issues += 1;
        }
    }

    println!("  ℹ️  Simulator expected at {}", config.environment.base_url);

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
