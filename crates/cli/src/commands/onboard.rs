//! `zema onboard`: First-time setup.

use zema_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Zema — First-Time Setup");
    println!("=======================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Start the model server: ollama serve");
    println!("   2. Pull the default model: ollama pull {}", AppConfig::default().llm.model);
    println!("   3. Check everything works: zema doctor");
    println!("   4. Run: zema chat\n");

    Ok(())
}
