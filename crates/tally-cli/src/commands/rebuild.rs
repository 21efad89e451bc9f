//! Rebuild command handler

use anyhow::{bail, Result};

use tally_core::sync::RebuildOutcome;
use tally_core::{Ledger, SearchIndex};

use crate::output::{Output, OutputFormat};

/// Drop and reload every search index from the relational store
pub fn rebuild<I: SearchIndex>(ledger: &Ledger<I>, output: &Output) -> Result<()> {
    let report = ledger.rebuild();

    if report.is_success() {
        output.print_rebuild(&report);
        return Ok(());
    }

    // The error envelope carries the failures in JSON mode
    if output.format == OutputFormat::Human {
        output.print_rebuild(&report);
    }

    let failures: Vec<String> = report
        .failures()
        .map(|entry| match entry.outcome {
            RebuildOutcome::Failed { ref error } => format!("{}: {}", entry.index, error),
            _ => entry.index.to_string(),
        })
        .collect();
    bail!(
        "Rebuild failed for {} index(es): {}",
        failures.len(),
        failures.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::Value;
    use tally_core::{Database, Sale, SqliteIndex};

    use crate::output::Captured;

    #[test]
    fn test_rebuild_loads_existing_rows() {
        let database = Database::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        database.create(&Sale::new(10.0, date)).unwrap();

        // Written behind the ledger's back, so the index never saw it
        let index = SqliteIndex::open_in_memory().unwrap();
        let ledger = Ledger::new(database, index);
        assert_eq!(ledger.index().document_count("eb_sales").unwrap(), None);

        rebuild(&ledger, &Output::new(OutputFormat::Quiet)).unwrap();
        assert_eq!(ledger.index().document_count("eb_sales").unwrap(), Some(1));
    }

    #[test]
    fn test_json_rebuild_prints_single_envelope() {
        let ledger = Ledger::new(
            Database::open_in_memory().unwrap(),
            SqliteIndex::open_in_memory().unwrap(),
        );
        let (output, captured) = Captured::output(OutputFormat::Json);

        rebuild(&ledger, &output).unwrap();

        let value: Value = serde_json::from_str(&captured.text()).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "Rebuilt search indexes");
        assert_eq!(value["data"]["indexes"].as_array().unwrap().len(), 5);
    }
}
