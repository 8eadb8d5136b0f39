//! Workbook reading through calamine (xlsx, xlsm, xls, xlsb, ods).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use tagsync_recon::model::format_number;
use tagsync_recon::{CellValue, SheetData, SyncError, WorkbookOpener, WorkbookSource};

/// Opens workbooks from disk with calamine's format auto-detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxOpener;

impl WorkbookOpener for XlsxOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn WorkbookSource>, SyncError> {
        Ok(Box::new(XlsxWorkbook::open(path)?))
    }
}

pub struct XlsxWorkbook {
    inner: Sheets<BufReader<File>>,
    names: Vec<String>,
}

impl XlsxWorkbook {
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let inner = open_workbook_auto(path).map_err(|e| {
            SyncError::Workbook(format!("failed to open {}: {e}", path.display()))
        })?;
        let names = inner.sheet_names().to_vec();
        log::debug!("opened {} ({} sheets)", path.display(), names.len());
        Ok(Self { inner, names })
    }
}

impl WorkbookSource for XlsxWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn read_sheet(&mut self, name: &str) -> Result<SheetData, SyncError> {
        let range = self
            .inner
            .worksheet_range(name)
            .map_err(|e| SyncError::Workbook(format!("failed to read sheet '{name}': {e}")))?;

        // The used range starts at the first non-empty cell; its first row is the header row.
        let mut rows = range.rows();
        let headers = match rows.next() {
            Some(row) => row.iter().map(|c| convert_cell(c).to_text()).collect(),
            None => Vec::new(),
        };
        let rows: Vec<Vec<CellValue>> = rows
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        log::debug!("sheet '{name}': {} columns, {} data rows", headers.len(), rows.len());
        Ok(SheetData::new(name, headers, rows))
    }
}

/// Map a calamine cell onto the comparable value model.
pub fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::from(if *b { "TRUE" } else { "FALSE" }),
        Data::Error(e) => CellValue::Text(format!("#{e:?}")),
        Data::DateTime(dt) => CellValue::Text(serial_to_text(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Render an Excel date serial (1900 system) as `YYYY-MM-DD[ HH:MM:SS]`.
/// Serials that cannot be represented fall back to the number itself.
pub fn serial_to_text(serial: f64) -> String {
    if !serial.is_finite() || serial < 0.0 {
        return format_number(serial);
    }
    let mut days = serial.floor() as u64;
    let mut seconds = ((serial - serial.floor()) * 86_400.0).round() as u32;
    if seconds >= 86_400 {
        days += 1;
        seconds = 0;
    }

    let date = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|base| base.checked_add_days(Days::new(days)));
    let Some(date) = date else {
        return format_number(serial);
    };
    if seconds == 0 {
        return date.format("%Y-%m-%d").to_string();
    }
    match NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0) {
        Some(time) => NaiveDateTime::new(date, time).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format_number(serial),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    #[test]
    fn cell_conversion() {
        assert_eq!(convert_cell(&Data::Empty), CellValue::Null);
        assert_eq!(convert_cell(&Data::String("x".into())), CellValue::from("x"));
        assert_eq!(convert_cell(&Data::Float(1.5)), CellValue::Number(1.5));
        assert_eq!(convert_cell(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(convert_cell(&Data::Bool(true)), CellValue::from("TRUE"));
        assert_eq!(
            convert_cell(&Data::DateTimeIso("2024-01-02".into())),
            CellValue::from("2024-01-02")
        );
    }

    #[test]
    fn date_serials() {
        assert_eq!(serial_to_text(45292.0), "2024-01-01");
        assert_eq!(serial_to_text(45292.5), "2024-01-01 12:00:00");
        assert_eq!(serial_to_text(1.0), "1899-12-31");
        assert_eq!(serial_to_text(-3.0), "-3");
    }

    #[test]
    fn reads_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.xlsx");

        let mut wb = Workbook::new();
        let ws = wb.add_worksheet().set_name("Sensors").unwrap();
        ws.write_string(0, 0, "Tag").unwrap();
        ws.write_string(0, 1, "Temp (C)").unwrap();
        ws.write_string(1, 0, "T-100").unwrap();
        ws.write_number(1, 1, 21.5).unwrap();
        ws.write_string(2, 0, "T-200").unwrap();
        wb.add_worksheet().set_name("Notes").unwrap();
        wb.save(&path).unwrap();

        let mut book = XlsxOpener.open(&path).unwrap();
        assert_eq!(book.sheet_names(), vec!["Sensors", "Notes"]);

        let sheet = book.read_sheet("Sensors").unwrap();
        assert_eq!(sheet.headers, vec!["Tag", "Temp (C)"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.cell(0, 1), &CellValue::Number(21.5));
        assert_eq!(sheet.cell(1, 1), &CellValue::Null);

        let empty = book.read_sheet("Notes").unwrap();
        assert!(empty.headers.is_empty());
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn missing_file_is_workbook_error() {
        let err = XlsxOpener.open(Path::new("/nonexistent/input.xlsx")).err().unwrap();
        assert!(matches!(err, SyncError::Workbook(_)));
    }

    #[test]
    fn missing_sheet_is_workbook_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.xlsx");
        let mut wb = Workbook::new();
        wb.add_worksheet().set_name("Only").unwrap();
        wb.save(&path).unwrap();

        let mut book = XlsxWorkbook::open(&path).unwrap();
        assert!(matches!(book.read_sheet("Other"), Err(SyncError::Workbook(_))));
    }
}
