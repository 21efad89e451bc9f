//! Status command handler

use anyhow::{Context, Result};

use tally_core::config::IndexBackend;
use tally_core::{Config, Ledger, SearchIndex};

use crate::output::Output;

/// Show row and document counts for every index
pub fn show<I: SearchIndex>(ledger: &Ledger<I>, config: &Config, output: &Output) -> Result<()> {
    let indexes = ledger.status().context("Failed to read index status")?;
    let (backend, location) = describe_backend(config);

    output.print_status(backend, &location, &indexes);
    Ok(())
}

/// Backend name and where its data lives
fn describe_backend(config: &Config) -> (&'static str, String) {
    match config.index.backend {
        IndexBackend::Sqlite => ("sqlite", config.index_path().display().to_string()),
        IndexBackend::Meilisearch => (
            "meilisearch",
            config
                .index
                .url
                .clone()
                .unwrap_or_else(|| "(not set)".to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_describe_backend() {
        let mut config = Config {
            data_dir: PathBuf::from("/data/tally"),
            ..Default::default()
        };
        let (backend, location) = describe_backend(&config);
        assert_eq!(backend, "sqlite");
        assert!(location.ends_with("search.db"));

        config.index.backend = IndexBackend::Meilisearch;
        assert_eq!(describe_backend(&config).1, "(not set)");

        config.index.url = Some("http://localhost:7700".to_string());
        assert_eq!(describe_backend(&config).1, "http://localhost:7700");
    }
}
