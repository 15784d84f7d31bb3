//! `contextweave init`: write a default configuration file.

use std::path::Path;

use contextweave_config::AppConfig;

pub async fn run(path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    if config_path.exists() && !force {
        println!("  Config already exists: {}", config_path.display());
        println!("  Use --force to overwrite it.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Wrote default config: {}", config_path.display());
    Ok(())
}
