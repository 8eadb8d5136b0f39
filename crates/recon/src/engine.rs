use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::mapping::MappingPolicy;
use crate::model::{
    Changeset, FieldValidationError, RunMode, RunResult, SheetOutcome, SheetStatus,
};
use crate::reconcile::{Prepared, SheetReconciler, simulated_outcome};
use crate::sink::{EventSink, Progress, Severity};
use crate::store::{DEFAULT_CHUNK_SIZE, RecordStore, StoreConnector};
use crate::validate::{DEFAULT_TOLERANCE, ValueValidator};
use crate::workbook::{WorkbookOpener, WorkbookSource};

/// Writes collected validation errors next to the input workbook.
pub trait ReportEmitter {
    fn emit(&self, input: &Path, errors: &[FieldValidationError]) -> Result<PathBuf, SyncError>;
}

/// Store target and comparison parameters for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub table: String,
    pub key_column: String,
    pub chunk_size: usize,
    pub tolerance: f64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            table: "AllTagslist".to_string(),
            key_column: "Tag Number".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Result of one sheet inside a run.
struct SheetRun {
    outcome: SheetOutcome,
    detected: usize,
    committed: usize,
}

impl SheetRun {
    fn outcome_only(outcome: SheetOutcome) -> Self {
        Self {
            outcome,
            detected: 0,
            committed: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences one run: mapping, connection, metadata, keys, sheets, report.
pub struct Orchestrator<'a> {
    settings: RunSettings,
    opener: &'a dyn WorkbookOpener,
    connector: &'a dyn StoreConnector,
    sink: &'a dyn EventSink,
    reports: Option<&'a dyn ReportEmitter>,
    progress: Option<&'a dyn Progress>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: RunSettings,
        opener: &'a dyn WorkbookOpener,
        connector: &'a dyn StoreConnector,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            settings,
            opener,
            connector,
            sink,
            reports: None,
            progress: None,
        }
    }

    pub fn with_reports(mut self, reports: &'a dyn ReportEmitter) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run reconciliation over every allowed sheet of `input`.
    ///
    /// Never fails: run-fatal errors come back as `success == false` with `error` set.
    pub fn run(&self, input: &Path, mapping: &Path, mode: RunMode) -> RunResult {
        let banner = if mode.is_simulation() {
            "SIMULATION MODE (no changes will be written)"
        } else {
            "UPDATE MODE"
        };
        self.sink.record(banner, Severity::Header);
        log::info!("run started: input={} mode={:?}", input.display(), mode);

        match self.execute(input, mapping, mode) {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                self.sink.record(&message, Severity::Error);
                log::error!("run aborted: {message}");
                RunResult::failed(mode, e)
            }
        }
    }

    fn execute(&self, input: &Path, mapping: &Path, mode: RunMode) -> Result<RunResult, SyncError> {
        let settings = &self.settings;

        self.sink.record("Loading mapping configuration...", Severity::Info);
        let policy = self.load_policy(mapping)?;
        self.notify("Configuration loaded");

        let mut workbook = self.opener.open(input)?;

        self.sink
            .record(&format!("Connecting to {}...", self.connector.describe()), Severity::Info);
        let mut store = self.connector.connect()?;
        self.notify("Connected");

        let table = store.introspect_columns(&settings.table)?;
        if !table.contains(&settings.key_column) {
            return Err(SyncError::Query(format!(
                "key column '{}' not found in table '{}'",
                settings.key_column, settings.table
            )));
        }
        self.sink.record(
            &format!(
                "Found {} columns ({} numeric)",
                table.all.len(),
                table.numeric.len()
            ),
            Severity::Info,
        );
        self.notify("Metadata loaded");

        let known_keys = store.fetch_all_keys(&settings.table, &settings.key_column)?;
        self.sink
            .record(&format!("Found {} keys in store", known_keys.len()), Severity::Info);
        self.notify("Keys loaded");

        let validator = ValueValidator::new(table.numeric.clone(), settings.tolerance);
        let reconciler = SheetReconciler::new(&policy, &table, &validator, &settings.key_column);

        let mut result = RunResult {
            success: true,
            mode,
            sheet_outcomes: Vec::new(),
            total_detected: 0,
            total_committed: 0,
            validation_errors: Vec::new(),
            report_path: None,
            error: None,
            failure: None,
        };

        for name in workbook.sheet_names() {
            if !policy.is_sheet_allowed(&name) {
                log::debug!("sheet '{name}' not allowed, ignoring");
                continue;
            }
            self.notify(&format!("Processing sheet: {name}"));
            let sheet = match self.process_sheet(
                store.as_mut(),
                workbook.as_mut(),
                &reconciler,
                &known_keys,
                &name,
                mode,
                &mut result.validation_errors,
            ) {
                Ok(sheet) => sheet,
                Err(e) => SheetRun::outcome_only(processing_failure(&name, e)),
            };
            self.record_outcome(&sheet.outcome, mode);
            result.total_detected += sheet.detected;
            result.total_committed += sheet.committed;
            result.sheet_outcomes.push(sheet.outcome);
            self.notify(&format!("Finished sheet: {name}"));
        }
        drop(store);

        if !result.validation_errors.is_empty() {
            self.sink.record(
                &format!("{} data type errors found", result.validation_errors.len()),
                Severity::Warning,
            );
            result.report_path = self.emit_report(input, &result.validation_errors);
            self.notify("Report written");
        }

        self.sink.record("Process completed", Severity::Header);
        log::info!(
            "run finished: {} sheets, {} detected, {} committed, {} validation errors",
            result.sheet_outcomes.len(),
            result.total_detected,
            result.total_committed,
            result.validation_errors.len()
        );
        Ok(result)
    }

    fn load_policy(&self, mapping: &Path) -> Result<MappingPolicy, SyncError> {
        let mut workbook = self.opener.open(mapping).map_err(|e| {
            SyncError::Config(format!("cannot open mapping workbook {}: {e}", mapping.display()))
        })?;
        MappingPolicy::from_workbook(workbook.as_mut())
    }

    /// Reconcile one sheet. Validation errors go to `errors` as soon as the sheet
    /// is prepared, so they are reported even when the fetch fails afterwards.
    /// Read and fetch failures come back as `SheetProcessing`.
    #[allow(clippy::too_many_arguments)]
    fn process_sheet(
        &self,
        store: &mut dyn RecordStore,
        workbook: &mut dyn WorkbookSource,
        reconciler: &SheetReconciler<'_>,
        known_keys: &HashSet<String>,
        name: &str,
        mode: RunMode,
        errors: &mut Vec<FieldValidationError>,
    ) -> Result<SheetRun, SyncError> {
        let settings = &self.settings;
        let sheet_error = |e: SyncError| SyncError::SheetProcessing {
            sheet: name.to_string(),
            message: e.to_string(),
        };

        let data = workbook.read_sheet(name).map_err(sheet_error)?;

        let mut prepared = match reconciler.prepare(&data, known_keys) {
            Prepared::Skipped(outcome) => return Ok(SheetRun::outcome_only(outcome)),
            Prepared::Ready(prepared) => prepared,
        };
        errors.append(&mut prepared.validation_errors);

        let candidates = prepared.candidate_keys();
        log::debug!("sheet '{name}': fetching {} candidate keys", candidates.len());
        let reference = store
            .fetch_by_keys(
                &settings.table,
                &settings.key_column,
                &candidates,
                settings.chunk_size,
            )
            .map_err(sheet_error)?;

        let changesets = reconciler.diff(&prepared, &reference);
        let detected = changesets.len();
        let mut outcome = simulated_outcome(name, detected);
        let mut committed = 0;

        if !mode.is_simulation() && !changesets.is_empty() {
            match self.apply(store, &changesets) {
                Ok(rows) => {
                    committed = rows;
                    outcome.status = SheetStatus::Applied;
                    outcome.description = format!("{rows} records updated");
                    outcome.update_count = rows;
                }
                Err(e) => {
                    outcome.status = SheetStatus::Failed;
                    outcome.description = format!("Update failed: {e}");
                }
            }
        }

        Ok(SheetRun {
            outcome,
            detected,
            committed,
        })
    }

    fn apply(&self, store: &mut dyn RecordStore, changesets: &[Changeset]) -> Result<usize, SyncError> {
        let settings = &self.settings;
        store.apply_changesets(&settings.table, &settings.key_column, changesets)
    }

    fn record_outcome(&self, outcome: &SheetOutcome, mode: RunMode) {
        let sheet = &outcome.sheet;
        match outcome.status {
            SheetStatus::Skipped => self
                .sink
                .record(&format!("{sheet}: skipped ({})", outcome.description), Severity::Info),
            SheetStatus::Simulated if mode.is_simulation() => self
                .sink
                .record(&format!("{sheet}: {} (simulation)", outcome.description), Severity::Info),
            SheetStatus::Simulated => self
                .sink
                .record(&format!("{sheet}: {}", outcome.description), Severity::Info),
            SheetStatus::Applied => self
                .sink
                .record(&format!("{sheet}: {}", outcome.description), Severity::Success),
            SheetStatus::Failed => self
                .sink
                .record(&format!("{sheet}: {}", outcome.description), Severity::Error),
        }
    }

    fn emit_report(&self, input: &Path, errors: &[FieldValidationError]) -> Option<PathBuf> {
        let reports = self.reports?;
        match reports.emit(input, errors) {
            Ok(path) => {
                self.sink
                    .record(&format!("Error report written: {}", path.display()), Severity::Warning);
                Some(path)
            }
            Err(e) => {
                self.sink
                    .record(&format!("Could not write error report: {e}"), Severity::Warning);
                None
            }
        }
    }

    fn notify(&self, stage: &str) {
        if let Some(progress) = self.progress {
            progress.notify(stage);
        }
    }
}

/// FAILED outcome for a sheet whose read or fetch failed.
fn processing_failure(sheet: &str, error: SyncError) -> SheetOutcome {
    log::warn!("{error}");
    let message = match error {
        SyncError::SheetProcessing { message, .. } => message,
        other => other.to_string(),
    };
    SheetOutcome::failed(sheet, format!("Processing error: {message}"))
}
