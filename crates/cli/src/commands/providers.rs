//! `supportline providers`: Check the provider chain and list models.

use std::path::Path;

use anyhow::Result;

use super::runtime;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = runtime::load_config(config_path)?;
    let router = supportline_providers::build_from_config(&config);

    println!("Provider chain");
    println!("==============");
    if !config.has_api_key() {
        println!("  No API key configured. Set GEMINI_API_KEY or SUPPORTLINE_API_KEY.\n");
    }

    let names = std::iter::once(&config.default_provider).chain(config.fallback_providers.iter());
    for (position, name) in names.enumerate() {
        let Some(provider) = router.get(name) else {
            println!("  {position}. {name}: not configured");
            continue;
        };

        let model = router.model_for(name).unwrap_or(config.default_model.as_str());
        match provider.health_check().await {
            Ok(true) => println!("  {position}. {name} ({model}): reachable"),
            Ok(false) => println!("  {position}. {name} ({model}): unhealthy"),
            Err(e) => {
                println!("  {position}. {name} ({model}): {e}");
                continue;
            }
        }

        match provider.list_models().await {
            Ok(models) if models.is_empty() => {}
            Ok(models) => {
                for listed in models.iter().take(10) {
                    let marker = if listed == model { " (in use)" } else { "" };
                    println!("       - {listed}{marker}");
                }
                if models.len() > 10 {
                    println!("       ... {} more", models.len() - 10);
                }
            }
            Err(e) => println!("       models unavailable: {e}"),
        }
    }

    Ok(())
}
