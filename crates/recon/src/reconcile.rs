//! Per-sheet reconciliation.
//!
//! A sheet goes through two phases. [`SheetReconciler::prepare`] normalizes and
//! maps headers, keeps rows whose key exists in the store, scopes columns,
//! coerces numeric cells and yields the candidate keys. [`SheetReconciler::diff`]
//! compares the prepared rows against reference records fetched for those keys.
//!
//! Candidate keys come from the filtered rows themselves, never from a diff
//! against an empty reference set, which could not produce any change.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::mapping::MappingPolicy;
use crate::model::{
    CellValue, Changeset, FieldValidationError, Record, SheetData, SheetOutcome, SheetStatus,
    format_number,
};
use crate::store::{TableColumns, index_by_key};
use crate::validate::ValueValidator;

pub const KEY_COLUMN_MISSING: &str = "Key column missing";
pub const NO_MATCHING_KEYS: &str = "No matching keys";
pub const NO_CHANGES: &str = "No changes";

// ---------------------------------------------------------------------------
// Header normalization
// ---------------------------------------------------------------------------

/// Non-breaking spaces become spaces, line breaks and tabs are removed, then trimmed.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .map(|c| if c == '\u{a0}' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Prepared sheet
// ---------------------------------------------------------------------------

/// A sheet after phase one: filtered, scoped, coerced and cleaned.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSheet {
    pub sheet: String,
    /// In-scope comparable columns in source order. Never contains the key column.
    pub columns: Vec<String>,
    /// Retained rows in source order, paired with their key.
    pub rows: Vec<(String, Record)>,
    pub validation_errors: Vec<FieldValidationError>,
}

impl PreparedSheet {
    /// Distinct keys of the retained rows, first occurrence order.
    pub fn candidate_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|(key, _)| seen.insert(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prepared {
    /// The sheet has nothing to reconcile. Carries the SKIPPED outcome.
    Skipped(SheetOutcome),
    Ready(PreparedSheet),
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Reconciles sheets against one store table under one mapping policy.
pub struct SheetReconciler<'a> {
    policy: &'a MappingPolicy,
    table: &'a TableColumns,
    validator: &'a ValueValidator,
    key_column: &'a str,
}

impl<'a> SheetReconciler<'a> {
    pub fn new(
        policy: &'a MappingPolicy,
        table: &'a TableColumns,
        validator: &'a ValueValidator,
        key_column: &'a str,
    ) -> Self {
        Self {
            policy,
            table,
            validator,
            key_column,
        }
    }

    /// Phase one.
    pub fn prepare(&self, sheet: &SheetData, known_keys: &HashSet<String>) -> Prepared {
        let name = sheet.name.as_str();

        // canonical name -> source column index, right-most wins
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (idx, raw) in sheet.headers.iter().enumerate() {
            let header = normalize_header(raw);
            if header.is_empty() {
                continue;
            }
            let canonical = self.policy.canonical_name(&header).to_string();
            positions.insert(canonical, idx);
        }

        let Some(&key_idx) = positions.get(self.key_column) else {
            log::warn!("sheet '{name}': key column '{}' missing", self.key_column);
            return Prepared::Skipped(SheetOutcome::skipped(name, KEY_COLUMN_MISSING));
        };

        let mut scoped: Vec<(String, usize)> = positions
            .into_iter()
            .filter(|(column, _)| self.in_scope(column))
            .collect();
        scoped.sort_by_key(|(_, idx)| *idx);

        let mut rows = Vec::new();
        for row in 0..sheet.rows.len() {
            let Some(key) = sheet.cell(row, key_idx).to_key() else {
                continue;
            };
            if !known_keys.contains(&key) {
                continue;
            }
            let record: Record = scoped
                .iter()
                .map(|(column, idx)| (column.clone(), sheet.cell(row, *idx).clone()))
                .collect();
            rows.push((key, record));
        }

        if rows.is_empty() {
            log::info!("sheet '{name}': no rows match store keys");
            return Prepared::Skipped(SheetOutcome::skipped(name, NO_MATCHING_KEYS));
        }

        let columns: Vec<String> = scoped.into_iter().map(|(column, _)| column).collect();
        let validation_errors = self.validator.coerce_numeric(name, &columns, &mut rows);
        for (_, record) in rows.iter_mut() {
            for (column, value) in record.iter_mut() {
                *value = self.clean(column, std::mem::replace(value, CellValue::Null));
            }
        }

        log::debug!(
            "sheet '{name}': {} rows, {} columns in scope, {} validation errors",
            rows.len(),
            columns.len(),
            validation_errors.len()
        );

        Prepared::Ready(PreparedSheet {
            sheet: name.to_string(),
            columns,
            rows,
            validation_errors,
        })
    }

    /// Phase two. One changeset per retained row that has at least one differing field.
    /// Rows whose key has no reference record produce nothing.
    pub fn diff(&self, prepared: &PreparedSheet, reference: &[Record]) -> Vec<Changeset> {
        let index = index_by_key(reference, self.key_column);
        let null = CellValue::Null;
        let mut changesets = Vec::new();

        for (key, record) in &prepared.rows {
            let Some(existing) = index.get(key) else {
                continue;
            };
            let mut fields = BTreeMap::new();
            for column in &prepared.columns {
                let source = record.get(column).unwrap_or(&null);
                let current = existing.get(column).unwrap_or(&null);
                if self.validator.column_values_differ(column, source, current) {
                    fields.insert(column.clone(), source.clone());
                }
            }
            if !fields.is_empty() {
                changesets.push(Changeset {
                    record_key: key.clone(),
                    fields,
                });
            }
        }

        changesets
    }

    /// Both phases in one call. The outcome is SKIPPED or SIMULATED.
    pub fn reconcile(
        &self,
        sheet: &SheetData,
        known_keys: &HashSet<String>,
        reference: &[Record],
    ) -> (SheetOutcome, Vec<Changeset>, Vec<FieldValidationError>) {
        match self.prepare(sheet, known_keys) {
            Prepared::Skipped(outcome) => (outcome, Vec::new(), Vec::new()),
            Prepared::Ready(prepared) => {
                let changesets = self.diff(&prepared, reference);
                let outcome = simulated_outcome(&prepared.sheet, changesets.len());
                (outcome, changesets, prepared.validation_errors)
            }
        }
    }

    fn in_scope(&self, column: &str) -> bool {
        column != self.key_column
            && self.policy.is_mapping_target(column)
            && self.table.contains(column)
            && !self.policy.is_ignored(column)
    }

    fn clean(&self, column: &str, value: CellValue) -> CellValue {
        if value.is_blank() {
            return CellValue::Null;
        }
        match value {
            // text columns compare as text so written values compare equal on re-diff
            CellValue::Number(n) if !self.validator.is_numeric(column) => {
                CellValue::Text(format_number(n))
            }
            other => other,
        }
    }
}

/// SIMULATED outcome for a diffed sheet.
pub fn simulated_outcome(sheet: &str, changes: usize) -> SheetOutcome {
    let description = if changes == 0 {
        NO_CHANGES.to_string()
    } else {
        format!("{changes} changes detected")
    };
    SheetOutcome {
        sheet: sheet.to_string(),
        description,
        status: SheetStatus::Simulated,
        update_count: changes,
    }
}
