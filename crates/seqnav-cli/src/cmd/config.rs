use super::load_config;
use crate::output::print_json;
use anyhow::Context;
use seqnav_core::config::{WarnLevel, CONFIG_FILE};
use std::path::{Path, PathBuf};

pub fn run(path: Option<&Path>, init: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let warnings = config.validate();

    if init {
        let target = path.map_or_else(|| PathBuf::from(CONFIG_FILE), Path::to_path_buf);
        config
            .save(&target)
            .with_context(|| format!("failed to write {}", target.display()))?;
        if !json {
            println!("Wrote {}", target.display());
        }
    }

    if json {
        print_json(&serde_json::json!({
            "path": path.map(|p| p.display().to_string()),
            "config": config,
            "warnings": warnings,
        }))?;
    } else {
        match path {
            Some(p) => println!("# {}", p.display()),
            None => println!("# built-in defaults"),
        }
        print!("{}", serde_yaml::to_string(&config)?);
        if warnings.is_empty() {
            println!("Config is valid. No warnings.");
        } else {
            for w in &warnings {
                let prefix = match w.level {
                    WarnLevel::Warning => "warning",
                    WarnLevel::Error => "error",
                };
                println!("[{prefix}] {}", w.message);
            }
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
