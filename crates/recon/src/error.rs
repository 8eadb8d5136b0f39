use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// Mapping workbook missing a table or a column.
    Config(String),
    /// Store unreachable.
    Connection(String),
    /// Introspection, fetch or update failure.
    Query(String),
    /// Input workbook could not be opened or a sheet could not be read.
    Workbook(String),
    /// Unexpected failure while reconciling one sheet.
    SheetProcessing { sheet: String, message: String },
    /// Error report could not be written.
    Report(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Connection(msg) => write!(f, "connection error: {msg}"),
            Self::Query(msg) => write!(f, "query error: {msg}"),
            Self::Workbook(msg) => write!(f, "workbook error: {msg}"),
            Self::SheetProcessing { sheet, message } => {
                write!(f, "error processing sheet '{sheet}': {message}")
            }
            Self::Report(msg) => write!(f, "report error: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {}
