//! Mapping of source records onto Listmonk import rows
//!
//! The import file is CSV with the header `email,name,attributes,status`.
//! `attributes` is a JSON object and `status` is always `confirmed`, so new
//! subscribers skip double opt-in.

use crate::extract::Batch;
use crate::source::SourceRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Subscription status written for every imported row
pub const STATUS_CONFIRMED: &str = "confirmed";

/// Header row of the import file
pub const IMPORT_HEADER: [&str; 4] = ["email", "name", "attributes", "status"];

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("email pattern is valid"));

/// Why a record was left out of the import
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("missing email")]
    MissingEmail,

    #[error("malformed email '{0}'")]
    InvalidEmail(String),
}

/// One row of the import file
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberRow {
    pub email: String,
    pub name: String,
    pub attributes: Map<String, Value>,
    /// Creation time of the source record, used for the checkpoint
    pub created_at: DateTime<Utc>,
}

impl SubscriberRow {
    fn csv_fields(&self) -> [String; 4] {
        [
            self.email.clone(),
            self.name.clone(),
            Value::Object(self.attributes.clone()).to_string(),
            STATUS_CONFIRMED.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: SkipReason,
}

/// Output of the transform stage
#[derive(Debug, Clone)]
pub struct TransformedBatch {
    pub rows: Vec<SubscriberRow>,
    pub skipped: Vec<SkippedRecord>,
    pub list_id: u64,
}

impl TransformedBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Newest creation time among the rows that will be uploaded
    pub fn max_created_at(&self) -> Option<DateTime<Utc>> {
        self.rows.iter().map(|r| r.created_at).max()
    }

    /// Serialize into the exact upload format of the import endpoint.
    pub fn to_csv(&self) -> String {
        let mut out = csv_line(IMPORT_HEADER.iter().copied());
        for row in &self.rows {
            let fields = row.csv_fields();
            out.push_str(&csv_line(fields.iter().map(String::as_str)));
        }
        out
    }
}

/// Join fields with commas, quoting only where needed.
pub fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Maps source records onto import rows
#[derive(Debug, Default, Clone, Copy)]
pub struct Transformer;

impl Transformer {
    pub fn new() -> Self {
        Self
    }

    /// Transform one record, or decide to skip it.
    pub fn transform_record(&self, record: &SourceRecord) -> Result<SubscriberRow, SkipReason> {
        let email = record
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(SkipReason::MissingEmail)?;
        if !EMAIL_PATTERN.is_match(email) {
            return Err(SkipReason::InvalidEmail(email.to_string()));
        }

        let name = record
            .display_name
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let mut attributes = Map::new();
        if let Some(first) = name.split_whitespace().next() {
            attributes.insert("firstName".to_string(), Value::from(first));
        }
        if !name.is_empty() {
            attributes.insert("fullName".to_string(), Value::from(name.as_str()));
        }
        attributes.insert(
            "createdAt".to_string(),
            Value::from(record.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );

        Ok(SubscriberRow {
            email: email.to_string(),
            name,
            attributes,
            created_at: record.created_at,
        })
    }

    /// Transform a whole batch. Malformed records are logged and counted,
    /// never fatal.
    pub fn transform_batch(&self, batch: &Batch) -> TransformedBatch {
        let mut rows = Vec::with_capacity(batch.len());
        let mut skipped = Vec::new();

        for record in &batch.records {
            match self.transform_record(record) {
                Ok(row) => rows.push(row),
                Err(reason) => {
                    warn!("Skipping source record '{}': {}", record.id, reason);
                    skipped.push(SkippedRecord {
                        id: record.id.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Transformed {} users for import, skipped {}",
            rows.len(),
            skipped.len()
        );

        TransformedBatch {
            rows,
            skipped,
            list_id: batch.list_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::testing::record;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_row_attributes() {
        let mut source = record("u1", "  ada@example.com ", at(1));
        source.display_name = Some("Ada King Lovelace".to_string());

        let row = Transformer::new().transform_record(&source).unwrap();
        assert_eq!(row.email, "ada@example.com");
        assert_eq!(row.attributes["firstName"], "Ada");
        assert_eq!(row.attributes["fullName"], "Ada King Lovelace");
        assert_eq!(row.attributes["createdAt"], "2024-04-01T09:00:00Z");
    }

    #[test]
    fn test_nameless_record_keeps_created_at_only() {
        let mut source = record("u1", "ada@example.com", at(1));
        source.display_name = None;
        let row = Transformer::new().transform_record(&source).unwrap();
        assert_eq!(row.name, "");
        assert_eq!(row.attributes.len(), 1);
    }

    #[test]
    fn test_skip_reasons() {
        let transformer = Transformer::new();
        let mut missing = record("u1", "", at(1));
        assert_eq!(
            transformer.transform_record(&missing),
            Err(SkipReason::MissingEmail)
        );
        missing.email = None;
        assert_eq!(
            transformer.transform_record(&missing),
            Err(SkipReason::MissingEmail)
        );

        let bad = record("u2", "not an email", at(1));
        assert_eq!(
            transformer.transform_record(&bad),
            Err(SkipReason::InvalidEmail("not an email".to_string()))
        );
    }

    #[test]
    fn test_batch_counts_skips_and_excludes_them_from_max() {
        let batch = Batch {
            records: vec![
                record("a", "a@x.io", at(1)),
                record("b", "b@x.io", at(2)),
                record("c", "", at(3)),
            ],
            list_id: 4,
            checkpoint: Checkpoint::epoch(),
            undated: Vec::new(),
        };
        let transformed = Transformer::new().transform_batch(&batch);
        assert_eq!(transformed.rows.len(), 2);
        assert_eq!(transformed.skipped.len(), 1);
        assert_eq!(transformed.skipped[0].id, "c");
        assert_eq!(transformed.max_created_at(), Some(at(2)));
    }

    #[test]
    fn test_csv_quotes_only_where_needed() {
        let mut source = record("a", "a@x.io", at(1));
        source.display_name = Some("Doe, Jane".to_string());
        let row = Transformer::new().transform_record(&source).unwrap();
        let batch = TransformedBatch {
            rows: vec![row],
            skipped: Vec::new(),
            list_id: 1,
        };

        let csv = batch.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("email,name,attributes,status"));
        assert_eq!(
            lines.next(),
            Some(
                "a@x.io,\"Doe, Jane\",\"{\"\"createdAt\"\":\"\"2024-04-01T09:00:00Z\"\",\
                 \"\"firstName\"\":\"\"Doe,\"\",\"\"fullName\"\":\"\"Doe, Jane\"\"}\",confirmed"
            )
        );
    }
}
