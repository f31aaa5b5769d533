//! Monitoring sheet ingestion

use std::path::Path;

use anyhow::{bail, Context};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use sitewatch_harness::RawRow;

pub const URL_COLUMN: &str = "url";
pub const TEST_TYPE_COLUMN: &str = "test_type";
pub const TEST_INPUT_COLUMN: &str = "test_input";

/// A sheet as read from disk: normalized headers plus every record, so the
/// output can carry the original columns through unchanged.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub records: Vec<StringRecord>,
    url: usize,
    test_type: usize,
    test_input: Option<usize>,
}

/// `Test Type` → `test_type`
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

impl Sheet {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open sheet {}", path.display()))?;
        Self::from_reader(reader)
            .with_context(|| format!("Failed to read sheet {}", path.display()))
    }

    pub fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> anyhow::Result<Self> {
        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
        let column = |name: &str| headers.iter().position(|h| h == name);

        let (Some(url), Some(test_type)) = (column(URL_COLUMN), column(TEST_TYPE_COLUMN)) else {
            bail!(
                "Sheet must have '{}' and '{}' columns (found: {})",
                URL_COLUMN,
                TEST_TYPE_COLUMN,
                headers.join(", ")
            );
        };
        let test_input = column(TEST_INPUT_COLUMN);

        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .context("Malformed CSV record")?;
        debug!("Read {} record(s) with columns {:?}", records.len(), headers);

        Ok(Self {
            headers,
            records,
            url,
            test_type,
            test_input,
        })
    }

    /// One [`RawRow`] per record, in sheet order
    pub fn rows(&self) -> Vec<RawRow> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let field = |i: usize| record.get(i).unwrap_or_default();
                RawRow::new(
                    index,
                    field(self.url),
                    field(self.test_type),
                    self.test_input.map(field),
                )
            })
            .collect()
    }
}
