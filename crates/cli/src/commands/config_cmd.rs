//! `contextweave config`: configuration management commands.

use std::path::{Path, PathBuf};

use contextweave_config::{AppConfig, PROJECT_TOKEN_THRESHOLD};
use contextweave_core::ChainKind;

pub async fn validate(path: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let loaded = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    match loaded {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let layering = &config.layering;
            let mut warnings = Vec::new();
            if layering.project_token_threshold != PROJECT_TOKEN_THRESHOLD {
                warnings.push("project_token_threshold differs from the standard project budget");
            }
            if layering.l2_preview_chars == 0 {
                warnings.push("l2_preview_chars = 0 drops all prior-turn previews");
            }
            if config.chat.system_prompt.trim().is_empty() {
                warnings.push("Empty system prompt: turns will have no L1_SYSTEM layer");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Chain:       {}", config.chat.default_chain);
            println!(
                "   Compaction:  {} tokens ({} chars)",
                layering.auto_compact_token_threshold,
                layering.char_threshold_for(ChainKind::LlmChain)
            );
            println!("   Project:     {} tokens", layering.project_token_threshold);
            println!("   Log level:   {}", config.logging.level);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };
    println!("{}", config_path.display());
    Ok(())
}
