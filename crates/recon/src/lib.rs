//! `tagsync-recon`: workbook-to-store reconciliation engine.
//!
//! Pure engine crate. Workbooks, stores, reports and message sinks are
//! collaborators behind traits; the adapters live in `tagsync-io`.

pub mod engine;
pub mod error;
pub mod mapping;
pub mod model;
pub mod reconcile;
pub mod sink;
pub mod store;
pub mod validate;
pub mod workbook;

pub use engine::{Orchestrator, ReportEmitter, RunSettings};
pub use error::SyncError;
pub use mapping::MappingPolicy;
pub use model::{
    CellValue, Changeset, FieldValidationError, Record, RunMode, RunResult, SheetData,
    SheetOutcome, SheetStatus, ValidationReason,
};
pub use reconcile::{Prepared, PreparedSheet, SheetReconciler};
pub use sink::{EventSink, LogSink, Progress, Severity};
pub use store::{RecordStore, StoreConnector, TableColumns};
pub use validate::ValueValidator;
pub use workbook::{MemoryWorkbook, WorkbookOpener, WorkbookSource};
