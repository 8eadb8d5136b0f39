//! Validation error reports.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};
use tagsync_recon::{FieldValidationError, ReportEmitter, SyncError};

pub const REPORT_HEADERS: [&str; 5] = ["Sheet Name", "Tag/Key", "Header", "Invalid Value", "Reason"];
const REPORT_SHEET: &str = "Errors";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown report format '{other}' (expected xlsx or csv)")),
        }
    }
}

/// `<stem>_ImportErrors_<YYYYMMDD_HHMMSS>.<ext>` in the input's directory.
pub fn report_path(input: &Path, format: ReportFormat, at: NaiveDateTime) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let name = format!(
        "{stem}_ImportErrors_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    );
    input.with_file_name(name)
}

fn row_cells(error: &FieldValidationError) -> [String; 5] {
    [
        error.sheet.clone(),
        error.record_key.clone(),
        error.header.clone(),
        error.invalid_value.clone(),
        error.reason.to_string(),
    ]
}

pub fn write_xlsx(path: &Path, errors: &[FieldValidationError]) -> Result<(), SyncError> {
    let xlsx_err = |e: rust_xlsxwriter::XlsxError| SyncError::Report(e.to_string());

    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xD3D3D3))
        .set_border(FormatBorder::Thin);
    let cell = Format::new().set_border(FormatBorder::Thin);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet().set_name(REPORT_SHEET).map_err(xlsx_err)?;

    for (col, title) in REPORT_HEADERS.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *title, &header)
            .map_err(xlsx_err)?;
    }
    for (idx, error) in errors.iter().enumerate() {
        let row = (idx + 1) as u32;
        for (col, value) in row_cells(error).iter().enumerate() {
            sheet
                .write_string_with_format(row, col as u16, value, &cell)
                .map_err(xlsx_err)?;
        }
    }
    sheet.autofit();

    workbook.save(path).map_err(xlsx_err)
}

pub fn write_csv(path: &Path, errors: &[FieldValidationError]) -> Result<(), SyncError> {
    let csv_err = |e: csv::Error| SyncError::Report(e.to_string());

    let mut writer = csv::WriterBuilder::new().from_path(path).map_err(csv_err)?;
    writer.write_record(REPORT_HEADERS).map_err(csv_err)?;
    for error in errors {
        writer.write_record(row_cells(error)).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| SyncError::Report(e.to_string()))
}

/// Writes reports next to the input workbook, or into `output_dir` when set.
#[derive(Debug, Clone, Default)]
pub struct ReportWriter {
    format: ReportFormat,
    output_dir: Option<PathBuf>,
}

impl ReportWriter {
    pub fn new(format: ReportFormat) -> Self {
        Self {
            format,
            output_dir: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn write_at(
        &self,
        input: &Path,
        errors: &[FieldValidationError],
        at: NaiveDateTime,
    ) -> Result<PathBuf, SyncError> {
        let mut path = report_path(input, self.format, at);
        if let (Some(dir), Some(name)) = (&self.output_dir, path.file_name()) {
            path = dir.join(name);
        }
        match self.format {
            ReportFormat::Xlsx => write_xlsx(&path, errors)?,
            ReportFormat::Csv => write_csv(&path, errors)?,
        }
        log::info!("wrote {} validation errors to {}", errors.len(), path.display());
        Ok(path)
    }
}

impl ReportEmitter for ReportWriter {
    fn emit(&self, input: &Path, errors: &[FieldValidationError]) -> Result<PathBuf, SyncError> {
        self.write_at(input, errors, Local::now().naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Data, Reader};
    use chrono::NaiveDate;
    use tagsync_recon::ValidationReason;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    fn errors() -> Vec<FieldValidationError> {
        vec![FieldValidationError {
            sheet: "Sensors".into(),
            record_key: "T-100".into(),
            header: "Temperature".into(),
            invalid_value: "abc".into(),
            reason: ValidationReason::TypeMismatch,
        }]
    }

    #[test]
    fn file_naming() {
        let path = report_path(Path::new("/data/Plant Tags.xlsx"), ReportFormat::Xlsx, at());
        assert_eq!(path, PathBuf::from("/data/Plant Tags_ImportErrors_20240305_140709.xlsx"));
        let path = report_path(Path::new("input.xlsm"), ReportFormat::Csv, at());
        assert_eq!(path, PathBuf::from("input_ImportErrors_20240305_140709.csv"));
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<ReportFormat>(), Ok(ReportFormat::Csv));
        assert_eq!("xlsx".parse::<ReportFormat>(), Ok(ReportFormat::Xlsx));
        assert!("pdf".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn csv_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tags.xlsx");
        let path = ReportWriter::new(ReportFormat::Csv)
            .write_at(&input, &errors(), at())
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Sheet Name,Tag/Key,Header,Invalid Value,Reason\n\
             Sensors,T-100,Temperature,abc,Type mismatch - expected numeric value\n"
        );
    }

    #[test]
    fn xlsx_report_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tags.xlsx");
        let path = ReportWriter::new(ReportFormat::Xlsx)
            .write_at(&input, &errors(), at())
            .unwrap();
        assert_eq!(path.parent(), Some(dir.path()));

        let mut book = open_workbook_auto(&path).unwrap();
        let range = book.worksheet_range("Errors").unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| {
                r.iter()
                    .map(|c| match c {
                        Data::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        assert_eq!(rows[0], REPORT_HEADERS);
        assert_eq!(rows[1][1], "T-100");
        assert_eq!(rows[1][4], "Type mismatch - expected numeric value");
    }

    #[test]
    fn output_dir_overrides_location() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        std::fs::create_dir(&out).unwrap();
        let path = ReportWriter::new(ReportFormat::Csv)
            .with_output_dir(&out)
            .write_at(Path::new("/elsewhere/tags.xlsx"), &errors(), at())
            .unwrap();
        assert_eq!(path.parent(), Some(out.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn unwritable_location_is_report_error() {
        let err = ReportWriter::new(ReportFormat::Csv)
            .write_at(Path::new("/nonexistent/dir/tags.xlsx"), &errors(), at())
            .unwrap_err();
        assert!(matches!(err, SyncError::Report(_)));
    }
}
