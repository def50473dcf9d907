//! `zema models`: List models installed on the inference service.

use zema_config::AppConfig;
use zema_core::provider::Provider;
use zema_providers::OllamaProvider;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let provider = OllamaProvider::from_config(&config.llm);
    let models = provider.list_models().await?;

    if models.is_empty() {
        println!("No models installed at {}.", provider.base_url());
        println!("Pull one with: ollama pull {}", config.llm.model);
        return Ok(());
    }

    println!("Models at {}:", provider.base_url());
    for name in &models {
        let marker = if is_same_model(name, &config.llm.model) { "*" } else { " " };
        println!("  {marker} {name}");
    }
    Ok(())
}

/// Ollama reports untagged models as `name:latest`.
pub fn is_same_model(installed: &str, wanted: &str) -> bool {
    installed == wanted || (!wanted.contains(':') && installed == format!("{wanted}:latest"))
}
