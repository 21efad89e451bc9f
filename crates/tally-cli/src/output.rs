//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON envelopes (--json flag)
//! - Quiet mode for scripting (--quiet flag), ids only
//!
//! JSON output always uses one of two envelopes:
//! `{"status": "success", "message": .., "data": ..}` or
//! `{"status": "error", "code": .., "message": ..}`.

use std::cell::RefCell;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::{json, Value};

use tally_core::sync::{IndexStatus, RebuildOutcome};
use tally_core::{Page, RebuildReport, SearchDocument, SyncError, User};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
    /// Where results go; errors always go to stderr
    sink: RefCell<Box<dyn Write>>,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self::with_writer(format, io::stdout())
    }

    pub fn with_writer(format: OutputFormat, writer: impl Write + 'static) -> Self {
        Self {
            format,
            sink: RefCell::new(Box::new(writer)),
        }
    }

    /// Write one line of results
    pub fn emit(&self, line: &str) {
        let mut sink = self.sink.borrow_mut();
        // Write errors (a closed pipe under `| head`) are ignored
        let _ = writeln!(sink, "{}", line).and_then(|_| sink.flush());
    }

    /// Write a value as one pretty-printed JSON document
    pub fn print_json(&self, value: &Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => self.emit(&text),
            Err(e) => eprintln!("Failed to serialize output: {}", e),
        }
    }

    /// Print a single projected record
    pub fn print_record(&self, message: &str, record: &SearchDocument) {
        match self.format {
            OutputFormat::Human => {
                if !message.is_empty() {
                    self.emit(&format!("✓ {}", message));
                }
                for (field, value) in flatten(record) {
                    self.emit(&format!("{:<24} {}", format!("{}:", field), value));
                }
            }
            OutputFormat::Json => self.print_json(&success_envelope(message, record)),
            OutputFormat::Quiet => {
                if let Some(id) = record.id() {
                    self.emit(&id.to_string());
                }
            }
        }
    }

    /// Print one page of search results
    pub fn print_page(&self, page: &Page) {
        match self.format {
            OutputFormat::Human => {
                if page.records.is_empty() {
                    self.emit("No records found.");
                    return;
                }
                for record in &page.records {
                    let id = record.id().map(|id| id.to_string()).unwrap_or_default();
                    self.emit(&format!("{:>6} | {}", id, truncate(&summary(record), 70)));
                }
                self.emit(&format!(
                    "\n{} of {} record(s), page {} (limit {}, by {} {})",
                    page.total_matched_count,
                    page.total_count,
                    page.page,
                    page.page_limit,
                    page.order_by,
                    page.sort_order
                ));
            }
            OutputFormat::Json => self.print_json(&success_envelope("", page)),
            OutputFormat::Quiet => {
                for record in &page.records {
                    if let Some(id) = record.id() {
                        self.emit(&id.to_string());
                    }
                }
            }
        }
    }

    /// Print per-index rebuild outcomes
    pub fn print_rebuild(&self, report: &RebuildReport) {
        match self.format {
            OutputFormat::Human => {
                for entry in &report.indexes {
                    let outcome = match entry.outcome {
                        RebuildOutcome::Loaded { documents } => {
                            format!("✓ {} document(s)", documents)
                        }
                        RebuildOutcome::Failed { ref error } => format!("✗ {}", error),
                        RebuildOutcome::Skipped => "- skipped".to_string(),
                    };
                    self.emit(&format!("{:<18} {}", entry.index, outcome));
                }
                self.emit(&format!("\n{} document(s) indexed", report.total_documents()));
            }
            OutputFormat::Json => self.print_json(&success_envelope("Rebuilt search indexes", report)),
            OutputFormat::Quiet => {}
        }
    }

    /// Print row and document counts per index
    pub fn print_status(&self, backend: &str, location: &str, indexes: &[IndexStatus]) {
        match self.format {
            OutputFormat::Human => {
                self.emit("Tally Status");
                self.emit("============");
                self.emit("");
                self.emit("Search index:");
                self.emit(&format!("  Backend:  {}", backend));
                self.emit(&format!("  Location: {}", location));
                self.emit("");
                self.emit(&format!("{:<18} {:>8} {:>10}  State", "Index", "Rows", "Documents"));
                for status in indexes {
                    let documents = status
                        .documents
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let state = match status.documents {
                        None => "missing",
                        Some(_) if status.in_sync() => "ok",
                        Some(_) => "stale",
                    };
                    self.emit(&format!(
                        "{:<18} {:>8} {:>10}  {}",
                        status.index, status.rows, documents, state
                    ));
                }
                if indexes.iter().any(|s| !s.in_sync()) {
                    self.emit("");
                    self.emit("Run `tally rebuild` to bring the search index up to date.");
                }
            }
            OutputFormat::Json => self.print_json(&success_envelope(
                "",
                json!({
                    "backend": backend,
                    "location": location,
                    "indexes": indexes,
                }),
            )),
            OutputFormat::Quiet => {
                let in_sync = indexes.iter().all(IndexStatus::in_sync);
                self.emit(if in_sync { "ok" } else { "stale" });
            }
        }
    }

    /// Print a user without their password hash
    pub fn print_user(&self, message: &str, user: &User) {
        match self.format {
            OutputFormat::Human => {
                if !message.is_empty() {
                    self.emit(&format!("✓ {}", message));
                }
                if let Some(id) = user.id {
                    self.emit(&format!("ID:    {}", id));
                }
                self.emit(&format!("Name:  {}", user.name));
                self.emit(&format!("Email: {}", user.email));
            }
            OutputFormat::Json => self.print_json(&success_envelope(message, user)),
            OutputFormat::Quiet => {
                if let Some(id) = user.id {
                    self.emit(&id.to_string());
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => self.emit(&format!("✓ {}", message)),
            OutputFormat::Json => self.print_json(&success_envelope(message, Value::Null)),
            OutputFormat::Quiet => {}
        }
    }

    /// Print an error to stderr (or as an envelope on stdout with --json)
    pub fn error(&self, err: &anyhow::Error) {
        let message = format!("{:#}", err);
        match self.format {
            OutputFormat::Json => self.print_json(&error_envelope(error_code(err), &message)),
            OutputFormat::Human => {
                eprintln!("✗ {}", message);
                if let Some(hint) = err
                    .downcast_ref::<SyncError>()
                    .and_then(SyncError::recovery_suggestion)
                {
                    eprintln!("  {}", hint);
                }
            }
            OutputFormat::Quiet => eprintln!("{}", message),
        }
    }
}

pub fn success_envelope(message: &str, data: impl Serialize) -> Value {
    json!({
        "status": "success",
        "message": message,
        "data": data,
    })
}

pub fn error_envelope(code: u16, message: &str) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message,
    })
}

/// HTTP-style status code for any command error
pub fn error_code(err: &anyhow::Error) -> u16 {
    if let Some(sync) = err.downcast_ref::<SyncError>() {
        sync.status_code()
    } else if err.downcast_ref::<serde_json::Error>().is_some() {
        400
    } else {
        500
    }
}

/// Dotted field paths with display values, nested objects expanded
fn flatten(record: &SearchDocument) -> Vec<(String, String)> {
    fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, inner, out);
                }
            }
            Value::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    let mut fields = Vec::new();
    for (key, value) in record.fields() {
        walk(key, value, &mut fields);
    }
    fields
}

/// One-line summary of a record's top-level fields, id excluded
fn summary(record: &SearchDocument) -> String {
    record
        .fields()
        .iter()
        .filter(|(key, _)| key.as_str() != "id")
        .filter_map(|(_, value)| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(true) => Some("yes".to_string()),
            Value::Object(map) => map
                .iter()
                .filter(|(key, _)| key.as_str() != "id")
                .find_map(|(_, v)| v.as_str().filter(|s| !s.is_empty()).map(str::to_string)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" · ")
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// In-memory sink for inspecting what a command printed
#[cfg(test)]
#[derive(Clone, Default)]
pub struct Captured(std::rc::Rc<RefCell<Vec<u8>>>);

#[cfg(test)]
impl Captured {
    pub fn output(format: OutputFormat) -> (Output, Self) {
        let captured = Self::default();
        (Output::with_writer(format, captured.clone()), captured)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

#[cfg(test)]
impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::sync::Operation;
    use tally_core::IndexError;

    fn doc(value: Value) -> SearchDocument {
        SearchDocument::from_value(value).unwrap()
    }

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_json_output_is_one_document() {
        let (output, captured) = Captured::output(OutputFormat::Json);
        output.print_record("Created", &doc(json!({"id": 7, "name": "Acme"})));

        let value: Value = serde_json::from_str(&captured.text()).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["name"], "Acme");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééééééé", 5), "éé...");
    }

    #[test]
    fn test_flatten_nested() {
        let record = doc(json!({
            "id": 3,
            "price": 100.0,
            "relationships": {"id": 2, "name": "Acme"},
        }));

        let fields = flatten(&record);
        assert!(fields.contains(&("id".to_string(), "3".to_string())));
        assert!(fields.contains(&("relationships.name".to_string(), "Acme".to_string())));
        assert!(fields.contains(&("relationships.id".to_string(), "2".to_string())));
    }

    #[test]
    fn test_summary_skips_ids_and_blanks() {
        let record = doc(json!({
            "id": 3,
            "name": "Acme",
            "address": "",
            "relationships": {"id": 2, "name": "Bolt"},
        }));
        assert_eq!(summary(&record), "Acme · Bolt");
    }

    #[test]
    fn test_envelopes() {
        let value = success_envelope("Created", json!({"id": 1}));
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["id"], 1);

        let value = error_envelope(404, "No record with id 9");
        assert_eq!(value["status"], "error");
        assert_eq!(value["code"], 404);
    }

    #[test]
    fn test_error_codes() {
        let err = anyhow::Error::new(SyncError::Validation("page".to_string()));
        assert_eq!(error_code(&err), 400);

        // Context doesn't hide the underlying kind
        let err = anyhow::Error::new(SyncError::Divergence {
            operation: Operation::Create,
            index: "eb_sales",
            id: 1,
            source: Box::new(IndexError::IndexNotFound("eb_sales".to_string())),
        })
        .context("Failed to create sales record");
        assert_eq!(error_code(&err), 502);

        let parse = serde_json::from_str::<Value>("{").unwrap_err();
        assert_eq!(error_code(&anyhow::Error::new(parse)), 400);

        assert_eq!(error_code(&anyhow::anyhow!("boom")), 500);
    }
}
