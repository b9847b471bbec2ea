//! `gridparley models` — List supported models.

use gridparley_config::AppConfig;
use gridparley_core::ModelSpec;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let configured = AppConfig::load().ok().map(|c| c.model);

    println!("🤖 Supported Models");
    println!("===================");
    println!();
    println!("  {:<20} {:<12} {:>10}", "Model", "Family", "Context");
    for (name, family, limit) in ModelSpec::known_models() {
        let marker = if configured.as_deref() == Some(name) { " ←" } else { "" };
        println!("  {name:<20} {:<12} {limit:>10}{marker}", family.to_string());
    }
    println!();
    println!("  Select with `model = \"...\"` in config.toml, GRIDPARLEY_MODEL, or --model.");

    Ok(())
}
