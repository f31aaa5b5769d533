//! Error types for the check harness

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a page driver.
///
/// `NoSuchElement` is the distinguished "expected absence" signal: page
/// predicates turn it into `false`/`None` instead of propagating it.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Driver failed to start: {0}")]
    Startup(String),

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),

    #[error("WebDriver transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl DriverError {
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::NoSuchElement(_))
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("{0}")]
    Driver(#[from] DriverError),

    #[error("HTTP probe of {url} failed: {reason}")]
    Probe { url: String, reason: String },

    #[error("Invalid {field} '{value}': {reason}")]
    Input {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unexpected content at {url}: {reason}")]
    UnexpectedContent { url: String, reason: String },

    #[error("Check timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn input(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::Input {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the row itself rather than the site or driver.
    pub fn is_input_error(&self) -> bool {
        matches!(self, HarnessError::Input { .. })
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// One problem found while validating a row of the input sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowProblem {
    /// 1-based data row number, as a spreadsheet user would count it
    pub row: usize,
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for RowProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}: {}", self.row, self.field, self.message)
    }
}

/// Batch-level validation failure. Fatal: no row runs when this is returned.
#[derive(Debug)]
pub struct ValidationError {
    pub problems: Vec<RowProblem>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input sheet is invalid ({} problem(s))", self.problems.len())?;
        for problem in &self.problems {
            write!(f, "\n  {}", problem)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_problem() {
        let err = ValidationError {
            problems: vec![
                RowProblem { row: 1, field: "url", message: "is empty".into() },
                RowProblem { row: 3, field: "test_input", message: "is missing".into() },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 problem(s)"));
        assert!(text.contains("row 1: url: is empty"));
        assert!(text.contains("row 3: test_input: is missing"));
    }

    #[test]
    fn test_input_error_names_field_and_value() {
        let err = HarnessError::input("test_input", "abc", "expected an integer");
        assert!(err.is_input_error());
        assert_eq!(err.to_string(), "Invalid test_input 'abc': expected an integer");
    }
}
