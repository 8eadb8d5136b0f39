//! CLI Exit Code Registry
//!
//! Single source of truth for `tagsync` exit codes.
//! Scripts and schedulers branch on these, so they are part of the shell contract.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | General error (I/O, aborted confirmation)                 |
//! | 2    | Usage error (bad arguments, missing input file)           |
//! | 3    | Settings could not be loaded or are invalid               |
//! | 4    | Mapping workbook missing a table or column                |
//! | 5    | Database unreachable                                      |
//! | 6    | Run aborted before or between sheets                      |
//! | 7    | Run completed but at least one sheet FAILED               |
//! | 8    | Run completed with validation errors and `--strict` given |

use tagsync_recon::{RunResult, SyncError};

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error. Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments, missing input files.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Setup (3-5)
// =============================================================================

/// Settings file unreadable or invalid, or no settings found at all.
pub const EXIT_SETTINGS: u8 = 3;

/// Mapping workbook unreadable or missing a table/column.
pub const EXIT_MAPPING: u8 = 4;

/// Database could not be opened.
pub const EXIT_CONNECTION: u8 = 5;

// =============================================================================
// Run (6-8)
// =============================================================================

/// Run-fatal error after setup (metadata, keys, input workbook).
pub const EXIT_RUN_FAILED: u8 = 6;

/// Run finished, one or more sheets ended FAILED.
pub const EXIT_SHEET_FAILED: u8 = 7;

/// Run finished with validation errors under `--strict`.
pub const EXIT_VALIDATION: u8 = 8;

/// Exit code for an engine error.
pub fn sync_exit_code(err: &SyncError) -> u8 {
    match err {
        SyncError::Config(_) => EXIT_MAPPING,
        SyncError::Connection(_) => EXIT_CONNECTION,
        SyncError::Query(_) | SyncError::Workbook(_) => EXIT_RUN_FAILED,
        SyncError::SheetProcessing { .. } => EXIT_SHEET_FAILED,
        SyncError::Report(_) => EXIT_ERROR,
    }
}

/// Exit code for a finished run. Run-fatal failures take precedence over
/// sheet failures, which take precedence over strict validation.
pub fn run_exit_code(result: &RunResult, strict: bool) -> u8 {
    if !result.success {
        return result
            .failure
            .as_ref()
            .map(sync_exit_code)
            .unwrap_or(EXIT_RUN_FAILED);
    }
    if result.failed_sheets() > 0 {
        return EXIT_SHEET_FAILED;
    }
    if strict && !result.validation_errors.is_empty() {
        return EXIT_VALIDATION;
    }
    EXIT_SUCCESS
}
