//! From untyped sheet rows to typed, validated check invocations
//!
//! Two gates run over every row:
//!
//! - [`validate_batch`] checks the whole sheet before anything executes and
//!   fails the run if any row is malformed.
//! - [`Check::from_row`] turns one row into the typed invocation at dispatch
//!   time. Its failures become an ERRORED outcome for that row only.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::catalog::{Facet, InputShape, TestType, Viewer};
use crate::driver::Locator;
use crate::error::{HarnessError, HarnessResult, RowProblem, ValidationError};

/// One record of the input sheet, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// 0-based position among the data rows
    pub index: usize,
    pub url: String,
    pub test_type: String,
    #[serde(default)]
    pub test_input: Option<String>,
}

impl RawRow {
    pub fn new(index: usize, url: &str, test_type: &str, test_input: Option<&str>) -> Self {
        Self {
            index,
            url: url.to_string(),
            test_type: test_type.to_string(),
            test_input: test_input.map(String::from),
        }
    }

    /// Row number as shown to users (1-based)
    pub fn number(&self) -> usize {
        self.index + 1
    }

    fn input(&self) -> Option<&str> {
        self.test_input
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A row whose URL and test type are known good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRow {
    pub index: usize,
    pub url: Url,
    pub test_type: TestType,
    pub test_input: Option<String>,
}

impl TryFrom<&RawRow> for TestRow {
    type Error = HarnessError;

    fn try_from(raw: &RawRow) -> HarnessResult<Self> {
        let test_type = TestType::parse(&raw.test_type).ok_or_else(|| {
            HarnessError::input("test_type", raw.test_type.as_str(), "unsupported test type")
        })?;
        let url = parse_absolute_url("url", &raw.url)?;
        let contract = test_type.contract();
        let test_input = match raw.input() {
            Some(input) if contract.shape == InputShape::None => {
                debug!("Row {}: ignoring test_input '{}' for {}", raw.number(), input, test_type);
                None
            }
            input => input.map(String::from),
        };

        if contract.requires_input && test_input.is_none() {
            return Err(HarnessError::input(
                "test_input",
                "",
                format!("{} requires a test input", test_type),
            ));
        }

        Ok(TestRow {
            index: raw.index,
            url,
            test_type,
            test_input,
        })
    }
}

/// Typed test invocation: the test type together with its parsed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    SiteAvailability,
    FacetLoad(Facet),
    CollectionCount(u64),
    ViewerLoad(Viewer),
    MiradorPageCount(u64),
    AbleplayerTranscriptLoad,
    ElementPresent(Locator),
    InvalidLinks,
    PermalinkRedirect(Url),
    RestOaiPmhXmlValidity,
}

impl Check {
    pub fn from_row(row: &TestRow) -> HarnessResult<Self> {
        let input = row.test_input.as_deref().unwrap_or_default();
        Ok(match row.test_type {
            TestType::SiteAvailability => Check::SiteAvailability,
            TestType::FacetLoad => Check::FacetLoad(Facet::parse(input).ok_or_else(|| {
                HarnessError::input(
                    "test_input",
                    input,
                    format!("unknown facet (expected one of {})", Facet::KEYWORDS.join(", ")),
                )
            })?),
            TestType::CollectionCount => Check::CollectionCount(parse_count(input)?),
            TestType::ViewerLoad(viewer) => Check::ViewerLoad(viewer),
            TestType::MiradorPageCount => Check::MiradorPageCount(parse_count(input)?),
            TestType::AbleplayerTranscriptLoad => Check::AbleplayerTranscriptLoad,
            TestType::ElementPresent => {
                let (method, selector) = split_pair(input).ok_or_else(|| {
                    HarnessError::input(
                        "test_input",
                        input,
                        "expected two non-empty parts separated by '|'",
                    )
                })?;
                Check::ElementPresent(Locator::from_method(method, selector)?)
            }
            TestType::InvalidLinks => Check::InvalidLinks,
            TestType::PermalinkRedirect => {
                Check::PermalinkRedirect(parse_absolute_url("test_input", input)?)
            }
            TestType::RestOaiPmhXmlValidity => Check::RestOaiPmhXmlValidity,
        })
    }
}

/// Validate every row; on failure report all problems at once.
pub fn validate_batch(rows: &[RawRow]) -> Result<Vec<TestRow>, ValidationError> {
    if rows.is_empty() {
        return Err(ValidationError {
            problems: vec![RowProblem {
                row: 0,
                field: "sheet",
                message: "contains no test rows".to_string(),
            }],
        });
    }

    let mut valid = Vec::with_capacity(rows.len());
    let mut problems = Vec::new();
    for raw in rows {
        match validate_row(raw) {
            Ok(row) => valid.push(row),
            Err(mut found) => problems.append(&mut found),
        }
    }

    if problems.is_empty() {
        Ok(valid)
    } else {
        Err(ValidationError { problems })
    }
}

/// Structural checks for one row: URL, test type, and input shape.
pub fn validate_row(raw: &RawRow) -> Result<TestRow, Vec<RowProblem>> {
    let problem = |field: &'static str, message: String| RowProblem {
        row: raw.number(),
        field,
        message,
    };
    let mut problems = Vec::new();

    if raw.url.trim().is_empty() {
        problems.push(problem("url", "is empty".to_string()));
    } else if let Err(e) = parse_absolute_url("url", &raw.url) {
        problems.push(problem("url", e.to_string()));
    }

    let test_type = if raw.test_type.trim().is_empty() {
        problems.push(problem("test_type", "is empty".to_string()));
        None
    } else {
        let parsed = TestType::parse(&raw.test_type);
        if parsed.is_none() {
            problems.push(problem(
                "test_type",
                format!("'{}' is not a supported test type", raw.test_type),
            ));
        }
        parsed
    };

    if let Some(test_type) = test_type {
        let contract = test_type.contract();
        match raw.input() {
            None if contract.requires_input => {
                problems.push(problem(
                    "test_input",
                    format!("is required for {}", test_type),
                ));
            }
            Some(input) if contract.requires_input => {
                if let Err(message) = check_shape(contract.shape, input) {
                    problems.push(problem("test_input", message));
                }
            }
            _ => {}
        }
    }

    if !problems.is_empty() {
        return Err(problems);
    }
    TestRow::try_from(raw).map_err(|e| vec![problem("row", e.to_string())])
}

fn check_shape(shape: InputShape, input: &str) -> Result<(), String> {
    match shape {
        InputShape::None => Ok(()),
        InputShape::Enum(allowed) => {
            let normalized = input.to_ascii_lowercase().replace([' ', '-'], "_");
            if allowed.contains(&normalized.as_str()) {
                Ok(())
            } else {
                Err(format!(
                    "'{}' is not one of {}",
                    input,
                    allowed.join(", ")
                ))
            }
        }
        InputShape::Integer => parse_count(input).map(|_| ()).map_err(|e| e.to_string()),
        InputShape::Pair => split_pair(input).map(|_| ()).ok_or_else(|| {
            format!("'{}' must be two non-empty parts separated by '|'", input)
        }),
        InputShape::Url => parse_absolute_url("test_input", input)
            .map(|_| ())
            .map_err(|e| e.to_string()),
    }
}

fn parse_count(input: &str) -> HarnessResult<u64> {
    input
        .trim()
        .parse::<u64>()
        .map_err(|_| HarnessError::input("test_input", input, "expected a non-negative integer"))
}

fn split_pair(input: &str) -> Option<(&str, &str)> {
    let mut parts = input.split('|');
    let (first, second) = (parts.next()?.trim(), parts.next()?.trim());
    if parts.next().is_some() || first.is_empty() || second.is_empty() {
        return None;
    }
    Some((first, second))
}

fn parse_absolute_url(field: &'static str, raw: &str) -> HarnessResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| HarnessError::input(field, raw, format!("not an absolute URL ({})", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(HarnessError::input(
            field,
            raw,
            format!("unsupported scheme '{}'", other),
        )),
    }
}
