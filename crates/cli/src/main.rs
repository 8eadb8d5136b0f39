// tagsync CLI - reconcile tag workbooks against a plant database table

mod console;
mod exit_codes;
mod util;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use tagsync_config::{Settings, SettingsError};
use tagsync_io::{ReportFormat, ReportWriter, SqliteConnector, XlsxOpener, XlsxWorkbook};
use tagsync_recon::{
    MappingPolicy, Orchestrator, RunMode, RunResult, RunSettings, StoreConnector, SyncError,
};

use console::{ConsoleSink, LogProgress, render_summary};
use exit_codes::{
    EXIT_ERROR, EXIT_SETTINGS, EXIT_SHEET_FAILED, EXIT_SUCCESS, EXIT_USAGE, EXIT_VALIDATION,
    run_exit_code, sync_exit_code,
};

#[derive(Parser)]
#[command(name = "tagsync")]
#[command(about = "Reconcile tag workbooks against a database table")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare an input workbook with the database and optionally write the differences
    #[command(after_help = "\
Examples:
  tagsync run 'Plant Tags.xlsx'
  tagsync run 'Plant Tags.xlsx' --mapping Script_Config.xlsx --report-format csv
  tagsync run 'Plant Tags.xlsx' --apply --yes --json > result.json
  tagsync run 'Plant Tags.xlsx' --strict || echo 'fix the error report first'

Without --apply the run is a simulation: differences are detected and
reported but nothing is written. When --mapping is omitted,
Script_Config.xlsx beside the input workbook is used.")]
    Run {
        /// Input workbook (xlsx, xlsm, xls, xlsb, ods)
        input: PathBuf,

        /// Mapping workbook with Column_Mapping, Allowed_Sheets, Ignored_Headers
        #[arg(long, short = 'm')]
        mapping: Option<PathBuf>,

        /// Settings file (default: ~/.config/tagsync/settings.toml)
        #[arg(long, short = 's', env = "TAGSYNC_SETTINGS")]
        settings: Option<PathBuf>,

        /// Write detected changes to the database
        #[arg(long)]
        apply: bool,

        /// Skip the confirmation prompt for --apply
        #[arg(long, short = 'y', requires = "apply")]
        yes: bool,

        /// Print the run result as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Also write the JSON run result to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Validation error report format: xlsx or csv
        #[arg(long, default_value = "xlsx")]
        report_format: ReportFormat,

        /// Directory for the error report (default: beside the input workbook)
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Exit non-zero when any cell failed validation
        #[arg(long)]
        strict: bool,
    },

    /// Test that the configured database can be opened
    #[command(after_help = "\
Examples:
  tagsync check
  tagsync check --settings site-b.toml --json")]
    Check {
        /// Settings file (default: ~/.config/tagsync/settings.toml)
        #[arg(long, short = 's', env = "TAGSYNC_SETTINGS")]
        settings: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a mapping workbook and show what it contains
    #[command(after_help = "\
Examples:
  tagsync mapping Script_Config.xlsx
  tagsync mapping Script_Config.xlsx --json")]
    Mapping {
        /// Mapping workbook
        file: PathBuf,

        /// Print the mapping as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        None => {
            eprintln!("Usage: tagsync <command> [options]");
            eprintln!("       tagsync --help for more information");
            Ok(())
        }
        Some(Commands::Run {
            input,
            mapping,
            settings,
            apply,
            yes,
            json,
            output,
            report_format,
            report_dir,
            strict,
        }) => cmd_run(RunArgs {
            input,
            mapping,
            settings,
            apply,
            yes,
            json,
            output,
            report_format,
            report_dir,
            strict,
        }),
        Some(Commands::Check { settings, json }) => cmd_check(settings, json),
        Some(Commands::Mapping { file, json }) => cmd_mapping(file, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn settings(err: SettingsError) -> Self {
        let hint = match &err {
            SettingsError::MissingVariable(_) => Some(format!(
                "create {} or pass --settings FILE",
                Settings::config_path().display()
            )),
            SettingsError::MissingSection { .. } => {
                Some("add a [database] section with at least `path = ...`".to_string())
            }
            _ => None,
        };
        Self { code: EXIT_SETTINGS, message: err.to_string(), hint }
    }

    /// Create error from an engine error with the matching exit code.
    pub fn sync(err: &SyncError) -> Self {
        let code = sync_exit_code(err);
        let hint = match err {
            SyncError::Connection(_) => {
                Some("check [database] path in the settings file; run `tagsync check`".to_string())
            }
            SyncError::Config(_) => Some(
                "the mapping workbook needs Column_Mapping, Allowed_Sheets and Ignored_Headers sheets"
                    .to_string(),
            ),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// run
// ============================================================================

struct RunArgs {
    input: PathBuf,
    mapping: Option<PathBuf>,
    settings: Option<PathBuf>,
    apply: bool,
    yes: bool,
    json: bool,
    output: Option<PathBuf>,
    report_format: ReportFormat,
    report_dir: Option<PathBuf>,
    strict: bool,
}

fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    if !args.input.is_file() {
        return Err(CliError::usage(format!(
            "input workbook not found: {}",
            args.input.display()
        )));
    }
    let mapping = resolve_mapping(&args.input, args.mapping.as_deref())?;
    let settings = Settings::load(args.settings.as_deref()).map_err(CliError::settings)?;
    log::info!("settings loaded from {}", settings.source);

    let mode = if args.apply { RunMode::Apply } else { RunMode::Simulate };
    if mode == RunMode::Apply && !args.yes {
        let prompt = format!(
            "Changes will be written to table '{}' in {}.",
            settings.database.table_name,
            settings.database.path.display()
        );
        let confirmed = util::confirm(&prompt, &mut io::stdin().lock(), &mut io::stderr())
            .map_err(|e| CliError::io(format!("reading confirmation: {e}")))?;
        if !confirmed {
            return Err(CliError::io("aborted, nothing was written")
                .with_hint("pass --yes to apply without prompting"));
        }
    }

    let run_settings = RunSettings {
        table: settings.database.table_name.clone(),
        key_column: settings.database.tag_column.clone(),
        chunk_size: settings.app.batch_size,
        tolerance: settings.app.float_threshold,
    };
    let connector = connector_for(&settings);
    let mut reports = ReportWriter::new(args.report_format);
    if let Some(dir) = &args.report_dir {
        if !dir.is_dir() {
            return Err(CliError::usage(format!("report directory not found: {}", dir.display())));
        }
        reports = reports.with_output_dir(dir);
    }
    let sink = ConsoleSink::new(args.json);
    let progress = LogProgress;

    let result = Orchestrator::new(run_settings, &XlsxOpener, &connector, &sink)
        .with_reports(&reports)
        .with_progress(&progress)
        .run(&args.input, &mapping, mode);

    if let Some(path) = &args.output {
        write_json_file(path, &result)?;
    }
    if args.json {
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| CliError::io(format!("serializing result: {e}")))?;
        println!("{text}");
    } else if result.success {
        eprintln!();
        eprint!("{}", render_summary(&result));
    }

    run_outcome(&result, args.strict)
}

/// Map a finished run to the command's result.
fn run_outcome(result: &RunResult, strict: bool) -> Result<(), CliError> {
    let code = run_exit_code(result, strict);
    match code {
        EXIT_SUCCESS => Ok(()),
        EXIT_SHEET_FAILED => Err(CliError {
            code,
            message: format!("{} sheet(s) failed", result.failed_sheets()),
            hint: Some("see the Status column; failed sheets were not written".to_string()),
        }),
        EXIT_VALIDATION => Err(CliError {
            code,
            message: format!(
                "{} cell(s) failed validation",
                result.validation_errors.len()
            ),
            hint: result
                .report_path
                .as_ref()
                .map(|p| format!("details in {}", p.display())),
        }),
        _ => match &result.failure {
            Some(err) => Err(CliError::sync(err)),
            None => Err(CliError {
                code,
                message: result.error.clone().unwrap_or_default(),
                hint: None,
            }),
        },
    }
}

fn resolve_mapping(input: &Path, explicit: Option<&Path>) -> Result<PathBuf, CliError> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(CliError::usage(format!(
            "mapping workbook not found: {}",
            path.display()
        ))),
        None => util::find_mapping_beside(input).ok_or_else(|| {
            CliError::usage("no mapping workbook given").with_hint(format!(
                "pass --mapping FILE or place {} beside the input workbook",
                util::DEFAULT_MAPPING_FILE
            ))
        }),
    }
}

fn connector_for(settings: &Settings) -> SqliteConnector {
    SqliteConnector::new(
        &settings.database.path,
        Duration::from_secs(settings.app.connection_timeout),
    )
}

fn write_json_file(path: &Path, result: &RunResult) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(result)
        .map_err(|e| CliError::io(format!("serializing result: {e}")))?;
    fs::write(path, text + "\n")
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))
}

// ============================================================================
// check
// ============================================================================

fn cmd_check(settings: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let settings = Settings::load(settings.as_deref()).map_err(CliError::settings)?;
    let connector = connector_for(&settings);
    let outcome = connector.test_connection();

    if json {
        let value = match &outcome {
            Ok(()) => serde_json::json!({
                "status": "online",
                "database": connector.describe(),
                "table": settings.database.table_name,
            }),
            Err(e) => serde_json::json!({
                "status": "error",
                "database": connector.describe(),
                "error": e.to_string(),
            }),
        };
        println!("{value}");
    } else if outcome.is_ok() {
        println!("online");
    }

    match outcome {
        Ok(()) => Ok(()),
        // already reported on stdout
        Err(e) if json => Err(CliError { code: sync_exit_code(&e), message: String::new(), hint: None }),
        Err(e) => Err(CliError::sync(&e)),
    }
}

// ============================================================================
// mapping
// ============================================================================

fn cmd_mapping(file: PathBuf, json: bool) -> Result<(), CliError> {
    if !file.is_file() {
        return Err(CliError::usage(format!("mapping workbook not found: {}", file.display())));
    }
    let policy = XlsxWorkbook::open(&file)
        .map_err(|e| SyncError::Config(e.to_string()))
        .and_then(|mut wb| MappingPolicy::from_workbook(&mut wb))
        .map_err(|e| CliError::sync(&e))?;

    let columns: BTreeMap<&str, &str> = policy
        .header_to_column
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    if json {
        let value = serde_json::json!({
            "column_mapping": columns,
            "allowed_sheets": policy.allowed_sheets,
            "ignored_headers": policy.ignored_headers,
        });
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| CliError::io(format!("serializing mapping: {e}")))?;
        println!("{text}");
        return Ok(());
    }

    println!("Column mappings: {}", columns.len());
    for (header, column) in &columns {
        println!("  {header} -> {column}");
    }
    println!("Allowed sheets: {}", policy.allowed_sheets.len());
    for sheet in &policy.allowed_sheets {
        println!("  {sheet}");
    }
    println!("Ignored headers: {}", policy.ignored_headers.len());
    for header in &policy.ignored_headers {
        println!("  {header}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes::EXIT_MAPPING;
    use tagsync_recon::{FieldValidationError, SheetOutcome, ValidationReason};

    fn finished() -> RunResult {
        RunResult {
            success: true,
            mode: RunMode::Simulate,
            sheet_outcomes: vec![SheetOutcome::skipped("Sensors", "No matching keys")],
            total_detected: 0,
            total_committed: 0,
            validation_errors: Vec::new(),
            report_path: None,
            error: None,
            failure: None,
        }
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "tagsync", "run", "tags.xlsx", "--apply", "--yes", "--report-format", "csv", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Run { apply, yes, report_format, strict, .. }) => {
                assert!(apply && yes && !strict);
                assert_eq!(report_format, ReportFormat::Csv);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn yes_requires_apply() {
        assert!(Cli::try_parse_from(["tagsync", "run", "tags.xlsx", "--yes"]).is_err());
    }

    #[test]
    fn unknown_report_format_is_rejected() {
        assert!(Cli::try_parse_from(["tagsync", "run", "t.xlsx", "--report-format", "pdf"]).is_err());
    }

    #[test]
    fn explicit_mapping_must_exist() {
        let err = resolve_mapping(Path::new("t.xlsx"), Some(Path::new("/nonexistent/map.xlsx")))
            .unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }

    #[test]
    fn missing_mapping_hints_at_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_mapping(&dir.path().join("t.xlsx"), None).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
        assert!(err.hint.unwrap().contains("Script_Config.xlsx"));
    }

    #[test]
    fn outcome_codes() {
        assert!(run_outcome(&finished(), true).is_ok());

        let mut strict = finished();
        strict.validation_errors.push(FieldValidationError {
            sheet: "Sensors".into(),
            record_key: "T-1".into(),
            header: "Temperature".into(),
            invalid_value: "abc".into(),
            reason: ValidationReason::TypeMismatch,
        });
        assert!(run_outcome(&strict, false).is_ok());
        assert_eq!(run_outcome(&strict, true).unwrap_err().code, EXIT_VALIDATION);

        let aborted = RunResult::failed(RunMode::Simulate, SyncError::Config("missing table 'Allowed_Sheets'".into()));
        let err = run_outcome(&aborted, false).unwrap_err();
        assert_eq!(err.code, EXIT_MAPPING);
        assert!(err.message.contains("missing table"));
    }
}
