//! `zema config`: Configuration management commands.

use std::path::Path;

pub async fn validate(path: Option<&Path>) -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    let config = match super::load_config(path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e:#}");
            return Err(e);
        }
    };
    println!("   ✅ Config parsed and validated");

    if !config.llm.is_loopback() {
        println!();
        println!(
            "   ⚠️  base_url {} is not on this machine; conversations will leave the device",
            config.llm.base_url
        );
    }

    println!();
    println!("   Service:   {}", config.llm.base_url);
    println!("   Model:     {}", config.llm.model);
    println!("   Sampling:  temperature {} / max {} tokens", config.llm.temperature, config.llm.max_tokens);
    println!(
        "   History:   keep {} turns, send {}, show {}",
        config.history.retention_cap, config.history.request_window, config.history.context_window
    );
    println!("   Log level: {}", config.log_level);

    Ok(())
}

pub async fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(path: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", super::config_file(path).display());
    Ok(())
}
