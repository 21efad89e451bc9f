//! Record command handlers
//!
//! One generic handler per operation. `for_kind!` picks the concrete
//! entity type from the `<kind>` argument.

use std::io::Read;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use tally_core::{Entity, Ledger, PageRequest, RecordId, SearchIndex};

use crate::output::Output;

/// Evaluate `$body` with `$entity` bound to the type named by an `EntityKind`
macro_rules! for_kind {
    ($kind:expr, $entity:ident => $body:expr) => {
        match $kind {
            tally_core::EntityKind::Relationships => {
                type $entity = tally_core::Relationship;
                $body
            }
            tally_core::EntityKind::Purchases => {
                type $entity = tally_core::Purchase;
                $body
            }
            tally_core::EntityKind::Inventory => {
                type $entity = tally_core::Inventory;
                $body
            }
            tally_core::EntityKind::Sales => {
                type $entity = tally_core::Sale;
                $body
            }
            tally_core::EntityKind::Miscellaneous => {
                type $entity = tally_core::Miscellaneous;
                $body
            }
        }
    };
}
pub(crate) use for_kind;

/// Create a record, or fully replace the one with the same id
pub fn put<E: Entity, I: SearchIndex>(ledger: &Ledger<I>, input: &str, output: &Output) -> Result<()> {
    let record: E = parse_input(input)?;
    let document = ledger
        .save(&record)
        .with_context(|| format!("Failed to save {} record", E::KIND))?;

    output.print_record(&format!("Saved {} record", E::KIND), &document);
    Ok(())
}

/// Create a new record; fails if the id is taken
pub fn create<E: Entity, I: SearchIndex>(
    ledger: &Ledger<I>,
    input: &str,
    output: &Output,
) -> Result<()> {
    let record: E = parse_input(input)?;
    let document = ledger
        .create(&record)
        .with_context(|| format!("Failed to create {} record", E::KIND))?;

    output.print_record(&format!("Created {} record", E::KIND), &document);
    Ok(())
}

/// Apply a partial update; omitted fields keep their value
pub fn update<E: Entity, I: SearchIndex>(
    ledger: &Ledger<I>,
    input: &str,
    output: &Output,
) -> Result<()> {
    let patch: E::Patch = parse_input(input)?;
    let document = ledger
        .update::<E>(patch)
        .with_context(|| format!("Failed to update {} record", E::KIND))?;

    output.print_record(&format!("Updated {} record", E::KIND), &document);
    Ok(())
}

/// Search one entity type's index
pub fn list<E: Entity, I: SearchIndex>(
    ledger: &Ledger<I>,
    request: &PageRequest,
    output: &Output,
) -> Result<()> {
    let page = ledger
        .search::<E>(request)
        .with_context(|| format!("Failed to list {} records", E::KIND))?;

    output.print_page(&page);
    Ok(())
}

/// Show one record, read from the relational store
pub fn show<E: Entity, I: SearchIndex>(
    ledger: &Ledger<I>,
    id: RecordId,
    output: &Output,
) -> Result<()> {
    let document = ledger.fetch::<E>(id)?;
    output.print_record("", &document);
    Ok(())
}

/// Delete a record and its search document
pub fn delete<E: Entity, I: SearchIndex>(
    ledger: &Ledger<I>,
    id: RecordId,
    output: &Output,
) -> Result<()> {
    let snapshot = ledger
        .delete::<E>(id)
        .with_context(|| format!("Failed to delete {} record {}", E::KIND, id))?;

    output.print_record(&format!("Deleted {} record {}", E::KIND, id), &snapshot);
    Ok(())
}

/// Read a JSON argument: inline text, `-` for stdin, or `@path` for a file
pub fn read_input(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read record from stdin")?;
        Ok(buffer)
    } else if let Some(path) = arg.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read record from {}", path))
    } else {
        Ok(arg.to_string())
    }
}

fn parse_input<T: DeserializeOwned>(arg: &str) -> Result<T> {
    let text = read_input(arg)?;
    let value = serde_json::from_str(&text).context("Invalid record JSON")?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tally_core::{Database, EntityKind, Relationship, Sale, SalePatch, SqliteIndex, SyncError};
    use tempfile::NamedTempFile;

    use crate::output::OutputFormat;

    fn ledger() -> Ledger<SqliteIndex> {
        Ledger::new(
            Database::open_in_memory().unwrap(),
            SqliteIndex::open_in_memory().unwrap(),
        )
    }

    fn quiet() -> Output {
        Output::new(OutputFormat::Quiet)
    }

    #[test]
    fn test_read_input_inline_and_file() {
        assert_eq!(read_input(r#"{"id": 1}"#).unwrap(), r#"{"id": 1}"#);

        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "Acme"}}"#).unwrap();
        let arg = format!("@{}", file.path().display());
        assert_eq!(read_input(&arg).unwrap(), r#"{"name": "Acme"}"#);

        assert!(read_input("@/nonexistent/record.json").is_err());
    }

    #[test]
    fn test_parse_patch_distinguishes_null() {
        let patch: SalePatch = parse_input(r#"{"id": 4, "purchase_id": null}"#).unwrap();
        assert_eq!(patch.purchase_id, Some(None));
        assert_eq!(patch.relationship_id, None);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = parse_input::<Sale>("{not json").unwrap_err();
        assert!(err.downcast_ref::<serde_json::Error>().is_some());
    }

    #[test]
    fn test_dispatch_by_kind() {
        let ledger = ledger();
        let output = quiet();

        let kind: EntityKind = "relationship".parse().unwrap();
        for_kind!(kind, E => create::<E, _>(&ledger, r#"{"name": "Acme"}"#, &output)).unwrap();

        let stored: Option<Relationship> = ledger.database().get(1).unwrap();
        assert_eq!(stored.unwrap().name, "Acme");
    }

    #[test]
    fn test_update_and_delete_flow() {
        let ledger = ledger();
        let output = quiet();

        let sale = r#"{"price": 100.0, "date": "2024-01-01", "credit": true}"#;
        create::<Sale, _>(&ledger, sale, &output).unwrap();
        update::<Sale, _>(&ledger, r#"{"id": 1, "credit": false}"#, &output).unwrap();

        let stored: Sale = ledger.database().get(1).unwrap().unwrap();
        assert!(!stored.credit);

        delete::<Sale, _>(&ledger, 1, &output).unwrap();
        let err = show::<Sale, _>(&ledger, 1, &output).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::NotFound { .. })
        ));
    }
}
