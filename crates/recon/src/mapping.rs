use std::collections::{BTreeSet, HashMap};

use crate::error::SyncError;
use crate::model::SheetData;
use crate::workbook::WorkbookSource;

// ---------------------------------------------------------------------------
// Table layout
// ---------------------------------------------------------------------------

pub const COLUMN_MAPPING_TABLE: &str = "Column_Mapping";
pub const SOURCE_HEADER_COLUMN: &str = "Excel_Header";
pub const TARGET_COLUMN_COLUMN: &str = "SQL_Column";

pub const ALLOWED_SHEETS_TABLE: &str = "Allowed_Sheets";
pub const SHEET_NAME_COLUMN: &str = "Sheet_Name";

pub const IGNORED_HEADERS_TABLE: &str = "Ignored_Headers";
pub const HEADER_NAME_COLUMN: &str = "Header_Name";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Header mapping and sheet/column scoping for one run. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingPolicy {
    /// Raw source header -> canonical store column. Later rows overwrite earlier ones.
    pub header_to_column: HashMap<String, String>,
    pub allowed_sheets: BTreeSet<String>,
    /// Canonical names excluded from comparison and update.
    pub ignored_headers: BTreeSet<String>,
}

impl MappingPolicy {
    /// Read the three mapping tables from a workbook.
    pub fn from_workbook(workbook: &mut dyn WorkbookSource) -> Result<Self, SyncError> {
        let names = workbook.sheet_names();
        let mut read = |table: &str| -> Result<SheetData, SyncError> {
            if !names.iter().any(|n| n == table) {
                return Err(SyncError::Config(format!("missing table '{table}'")));
            }
            workbook
                .read_sheet(table)
                .map_err(|e| SyncError::Config(format!("cannot read table '{table}': {e}")))
        };

        let mapping = read(COLUMN_MAPPING_TABLE)?;
        let allowed = read(ALLOWED_SHEETS_TABLE)?;
        let ignored = read(IGNORED_HEADERS_TABLE)?;
        Self::from_tables(&mapping, &allowed, &ignored)
    }

    pub fn from_tables(
        mapping: &SheetData,
        allowed: &SheetData,
        ignored: &SheetData,
    ) -> Result<Self, SyncError> {
        let source_idx = required_column(mapping, COLUMN_MAPPING_TABLE, SOURCE_HEADER_COLUMN)?;
        let target_idx = required_column(mapping, COLUMN_MAPPING_TABLE, TARGET_COLUMN_COLUMN)?;

        let mut header_to_column = HashMap::new();
        for row in 0..mapping.rows.len() {
            let source = mapping.cell(row, source_idx).to_text();
            let target = mapping.cell(row, target_idx).to_text();
            let (source, target) = (source.trim(), target.trim());
            if source.is_empty() || target.is_empty() {
                continue;
            }
            header_to_column.insert(source.to_string(), target.to_string());
        }

        let allowed_sheets = single_column(allowed, ALLOWED_SHEETS_TABLE, SHEET_NAME_COLUMN)?;
        let ignored_headers = single_column(ignored, IGNORED_HEADERS_TABLE, HEADER_NAME_COLUMN)?;

        log::info!(
            "mapping loaded: {} mappings, {} allowed sheets, {} ignored headers",
            header_to_column.len(),
            allowed_sheets.len(),
            ignored_headers.len()
        );

        Ok(Self {
            header_to_column,
            allowed_sheets,
            ignored_headers,
        })
    }

    pub fn is_sheet_allowed(&self, sheet: &str) -> bool {
        self.allowed_sheets.contains(sheet)
    }

    /// Canonical name for a normalized source header. Unmapped headers pass through.
    pub fn canonical_name<'a>(&'a self, header: &'a str) -> &'a str {
        self.header_to_column
            .get(header)
            .map(|s| s.as_str())
            .unwrap_or(header)
    }

    /// Whether `column` is the target of at least one mapping row.
    pub fn is_mapping_target(&self, column: &str) -> bool {
        self.header_to_column.values().any(|c| c == column)
    }

    pub fn is_ignored(&self, column: &str) -> bool {
        self.ignored_headers.contains(column)
    }
}

fn required_column(table: &SheetData, table_name: &str, column: &str) -> Result<usize, SyncError> {
    table.column_index(column).ok_or_else(|| {
        SyncError::Config(format!("table '{table_name}' is missing column '{column}'"))
    })
}

fn single_column(
    table: &SheetData,
    table_name: &str,
    column: &str,
) -> Result<BTreeSet<String>, SyncError> {
    let idx = required_column(table, table_name, column)?;
    Ok((0..table.rows.len())
        .map(|row| table.cell(row, idx).to_text().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
