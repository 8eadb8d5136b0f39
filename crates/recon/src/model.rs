use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single comparable value, from either a workbook cell or a store column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Null, empty text, or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Render as a record key: trimmed, integral numbers without decimals.
    /// Returns None when the result would be empty.
    pub fn to_key(&self) -> Option<String> {
        let key = match self {
            CellValue::Null => return None,
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.trim().to_string(),
        };
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }

    /// Text rendering used for reports and for text-typed columns.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

/// Integers without decimals, everything else in shortest round-trip form.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

static NULL_CELL: CellValue = CellValue::Null;

/// One row, keyed by canonical column name.
pub type Record = HashMap<String, CellValue>;

// ---------------------------------------------------------------------------
// Raw sheet input
// ---------------------------------------------------------------------------

/// A worksheet as read from a workbook: first row is the header row.
#[derive(Debug, Clone, Default)]
pub struct SheetData {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetData {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Index of the first header equal to `name` after trimming.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&NULL_CELL)
    }
}

// ---------------------------------------------------------------------------
// Diff output
// ---------------------------------------------------------------------------

/// Column -> new value for one record key. Never empty once emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Changeset {
    pub record_key: String,
    pub fields: BTreeMap<String, CellValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    TypeMismatch,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch => write!(f, "Type mismatch - expected numeric value"),
        }
    }
}

/// A cell that could not be coerced to its column's declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub sheet: String,
    pub record_key: String,
    pub header: String,
    pub invalid_value: String,
    pub reason: ValidationReason,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SheetStatus {
    Skipped,
    Simulated,
    Applied,
    Failed,
}

impl fmt::Display for SheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Simulated => write!(f, "SIMULATED"),
            Self::Applied => write!(f, "APPLIED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetOutcome {
    pub sheet: String,
    pub description: String,
    pub status: SheetStatus,
    pub update_count: usize,
}

impl SheetOutcome {
    pub fn skipped(sheet: &str, description: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            description: description.to_string(),
            status: SheetStatus::Skipped,
            update_count: 0,
        }
    }

    pub fn failed(sheet: &str, description: String) -> Self {
        Self {
            sheet: sheet.to_string(),
            description,
            status: SheetStatus::Failed,
            update_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Compute and report changesets without writing them.
    Simulate,
    /// Apply changesets sheet by sheet.
    Apply,
}

impl RunMode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, RunMode::Simulate)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub mode: RunMode,
    pub sheet_outcomes: Vec<SheetOutcome>,
    pub total_detected: usize,
    pub total_committed: usize,
    pub validation_errors: Vec<FieldValidationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The run-fatal error behind `error`, for callers that branch on its kind.
    #[serde(skip)]
    pub failure: Option<SyncError>,
}

impl RunResult {
    pub fn failed(mode: RunMode, failure: SyncError) -> Self {
        Self {
            success: false,
            mode,
            sheet_outcomes: Vec::new(),
            total_detected: 0,
            total_committed: 0,
            validation_errors: Vec::new(),
            report_path: None,
            error: Some(failure.to_string()),
            failure: Some(failure),
        }
    }

    pub fn failed_sheets(&self) -> usize {
        self.sheet_outcomes
            .iter()
            .filter(|o| o.status == SheetStatus::Failed)
            .count()
    }
}
