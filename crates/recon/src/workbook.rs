use std::path::Path;

use crate::error::SyncError;
use crate::model::SheetData;

/// An opened workbook: named worksheets in workbook order.
pub trait WorkbookSource {
    fn sheet_names(&self) -> Vec<String>;

    /// Read a whole worksheet. The first row becomes the header row.
    fn read_sheet(&mut self, name: &str) -> Result<SheetData, SyncError>;
}

/// Opens workbooks by path. Errors are `SyncError::Workbook`.
pub trait WorkbookOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn WorkbookSource>, SyncError>;
}

/// A workbook held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    sheets: Vec<SheetData>,
}

impl MemoryWorkbook {
    pub fn new(sheets: Vec<SheetData>) -> Self {
        Self { sheets }
    }

    pub fn push(&mut self, sheet: SheetData) {
        self.sheets.push(sheet);
    }
}

impl WorkbookSource for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    fn read_sheet(&mut self, name: &str) -> Result<SheetData, SyncError> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| SyncError::Workbook(format!("sheet '{name}' not found")))
    }
}
