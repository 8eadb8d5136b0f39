// Workbook, store and report adapters

pub mod report;
pub mod store;
pub mod xlsx;

pub use report::{ReportFormat, ReportWriter};
pub use store::{SqliteConnector, SqliteStore};
pub use xlsx::{XlsxOpener, XlsxWorkbook};
