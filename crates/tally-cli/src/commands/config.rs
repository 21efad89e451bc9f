//! Config command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use tally_core::Config;

use crate::output::{success_envelope, Output, OutputFormat};

/// Show current configuration
pub fn show(config: &Config, config_path: &Path, output: &Output) -> Result<()> {
    let api_key = config.index.api_key.as_ref().map(|_| "********");

    match output.format {
        OutputFormat::Json => {
            output.print_json(&success_envelope(
                "",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "index": {
                        "backend": config.index.backend,
                        "url": config.index.url,
                        "api_key": api_key,
                        "task_timeout_ms": config.index.task_timeout_ms,
                    },
                    "rebuild": {
                        "stop_on_error": config.rebuild.stop_on_error,
                    },
                    "default_page_limit": config.default_page_limit,
                    "max_page_limit": config.max_page_limit,
                    "log_level": config.log_level(),
                    "config_file": config_path,
                }),
            ));
        }
        OutputFormat::Quiet => {
            output.emit(&config.data_dir.display().to_string());
        }
        OutputFormat::Human => {
            output.emit("Configuration:");
            output.emit(&format!("  data_dir:              {}", config.data_dir.display()));
            output.emit(&format!("  index.backend:         {:?}", config.index.backend));
            output.emit(&format!(
                "  index.url:             {}",
                config.index.url.as_deref().unwrap_or("(not set)")
            ));
            output.emit(&format!(
                "  index.api_key:         {}",
                api_key.unwrap_or("(not set)")
            ));
            output.emit(&format!("  index.task_timeout_ms: {}", config.index.task_timeout_ms));
            output.emit(&format!("  rebuild.stop_on_error: {}", config.rebuild.stop_on_error));
            output.emit(&format!("  default_page_limit:    {}", config.default_page_limit));
            output.emit(&format!("  max_page_limit:        {}", config.max_page_limit));
            output.emit(&format!("  log_level:             {}", config.log_level()));
            output.emit("");
            output.emit(&format!("Config file: {}", config_path.display()));
        }
    }

    Ok(())
}

/// Set a configuration value and save it
pub fn set(
    mut config: Config,
    key: String,
    value: String,
    config_path: &Path,
    output: &Output,
) -> Result<()> {
    apply(&mut config, &key, &value)?;

    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

/// Assign one dotted key
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let optional = |value: &str| {
        if value.is_empty() || value == "none" {
            None
        } else {
            Some(value.to_string())
        }
    };

    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "index.backend" => {
            config.index.backend = value.parse()?;
        }
        "index.url" => {
            config.index.url = optional(value);
        }
        "index.api_key" => {
            config.index.api_key = optional(value);
        }
        "index.task_timeout_ms" => {
            config.index.task_timeout_ms = value
                .parse()
                .context("Invalid value for index.task_timeout_ms. Use a number of milliseconds.")?;
        }
        "rebuild.stop_on_error" => {
            config.rebuild.stop_on_error = value
                .parse()
                .context("Invalid value for rebuild.stop_on_error. Use 'true' or 'false'.")?;
        }
        "default_page_limit" => {
            config.default_page_limit = parse_limit(key, value)?;
        }
        "max_page_limit" => {
            config.max_page_limit = parse_limit(key, value)?;
        }
        "log_level" => {
            config.log_level = optional(value);
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, index.backend, index.url, index.api_key, \
                 index.task_timeout_ms, rebuild.stop_on_error, default_page_limit, \
                 max_page_limit, log_level",
                key
            );
        }
    }

    if config.default_page_limit > config.max_page_limit {
        bail!(
            "default_page_limit ({}) cannot exceed max_page_limit ({})",
            config.default_page_limit,
            config.max_page_limit
        );
    }

    Ok(())
}

fn parse_limit(key: &str, value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => bail!("Invalid value for {}. Use a positive number.", key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::config::IndexBackend;
    use tempfile::TempDir;

    #[test]
    fn test_apply_keys() {
        let mut config = Config::default();

        apply(&mut config, "index.backend", "meilisearch").unwrap();
        apply(&mut config, "index.url", "http://localhost:7700").unwrap();
        apply(&mut config, "rebuild.stop_on_error", "true").unwrap();
        apply(&mut config, "default_page_limit", "10").unwrap();

        assert_eq!(config.index.backend, IndexBackend::Meilisearch);
        assert_eq!(config.index.url.as_deref(), Some("http://localhost:7700"));
        assert!(config.rebuild.stop_on_error);
        assert_eq!(config.default_page_limit, 10);

        apply(&mut config, "index.url", "none").unwrap();
        assert!(config.index.url.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();

        assert!(apply(&mut config, "sync_url", "x").is_err());
        assert!(apply(&mut config, "index.backend", "elastic").is_err());
        assert!(apply(&mut config, "rebuild.stop_on_error", "maybe").is_err());
        assert!(apply(&mut config, "max_page_limit", "0").is_err());
        assert!(apply(&mut config, "default_page_limit", "5000").is_err());
    }

    #[test]
    fn test_set_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let config = Config {
            data_dir: temp_dir.path().join("data"),
            ..Default::default()
        };

        set(
            config,
            "max_page_limit".to_string(),
            "50".to_string(),
            &path,
            &Output::new(OutputFormat::Quiet),
        )
        .unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("max_page_limit = 50"));
    }
}
