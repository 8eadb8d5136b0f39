use std::collections::HashSet;

use crate::model::{CellValue, FieldValidationError, Record, ValidationReason};

/// Default absolute tolerance for numeric equality.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Coerces numeric-declared columns and decides whether two values differ.
#[derive(Debug, Clone)]
pub struct ValueValidator {
    numeric_columns: HashSet<String>,
    tolerance: f64,
}

impl ValueValidator {
    pub fn new(numeric_columns: HashSet<String>, tolerance: f64) -> Self {
        Self {
            numeric_columns,
            tolerance,
        }
    }

    pub fn is_numeric(&self, column: &str) -> bool {
        self.numeric_columns.contains(column)
    }

    /// Coerce every numeric-declared column among `columns` in place.
    ///
    /// Blank cells become null silently. Cells with content that does not parse
    /// become null and produce one error each. `rows` pairs each record with its key.
    pub fn coerce_numeric(
        &self,
        sheet: &str,
        columns: &[String],
        rows: &mut [(String, Record)],
    ) -> Vec<FieldValidationError> {
        let numeric: Vec<&String> = columns.iter().filter(|c| self.is_numeric(c)).collect();
        if numeric.is_empty() {
            return Vec::new();
        }

        let mut errors = Vec::new();
        for (key, record) in rows.iter_mut() {
            for column in &numeric {
                let Some(value) = record.get_mut(column.as_str()) else {
                    continue;
                };
                match coerce_cell(value) {
                    Ok(coerced) => *value = coerced,
                    Err(()) => {
                        errors.push(FieldValidationError {
                            sheet: sheet.to_string(),
                            record_key: key.clone(),
                            header: column.to_string(),
                            invalid_value: value.to_text(),
                            reason: ValidationReason::TypeMismatch,
                        });
                        *value = CellValue::Null;
                    }
                }
            }
        }

        if !errors.is_empty() {
            log::debug!("sheet '{sheet}': {} numeric type errors", errors.len());
        }
        errors
    }

    /// Whether `source` should overwrite `reference`.
    ///
    /// A null source never differs, so existing store values are preserved.
    pub fn values_differ(&self, source: &CellValue, reference: &CellValue) -> bool {
        match (source, reference) {
            (CellValue::Null, _) => false,
            (CellValue::Number(a), CellValue::Number(b)) => (a - b).abs() > self.tolerance,
            _ => source != reference,
        }
    }

    /// `values_differ` for one column. Columns not declared numeric compare by
    /// text form: SQLite may return a number for a value written as text.
    pub fn column_values_differ(&self, column: &str, source: &CellValue, reference: &CellValue) -> bool {
        if self.is_numeric(column) {
            return self.values_differ(source, reference);
        }
        match source {
            CellValue::Null => false,
            _ => source.to_text() != reference.to_text(),
        }
    }
}

impl Default for ValueValidator {
    fn default() -> Self {
        Self::new(HashSet::new(), DEFAULT_TOLERANCE)
    }
}

/// Numeric coercion of a single cell. Err means the cell has content that is not a number.
fn coerce_cell(value: &CellValue) -> Result<CellValue, ()> {
    match value {
        CellValue::Null => Ok(CellValue::Null),
        CellValue::Number(n) if n.is_finite() => Ok(CellValue::Number(*n)),
        CellValue::Number(_) => Err(()),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(CellValue::Null);
            }
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(CellValue::Number(n)),
                _ => Err(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ValueValidator {
        ValueValidator::new(
            HashSet::from(["Temperature".to_string(), "Pressure".to_string()]),
            DEFAULT_TOLERANCE,
        )
    }

    fn row(key: &str, cells: &[(&str, CellValue)]) -> (String, Record) {
        (
            key.to_string(),
            cells
                .iter()
                .map(|(c, v)| (c.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn float_tolerance() {
        let v = validator();
        assert!(!v.values_differ(&CellValue::Number(1.0000001), &CellValue::Number(1.0000002)));
        assert!(v.values_differ(&CellValue::Number(1.0), &CellValue::Number(1.1)));
        assert!(!v.values_differ(&CellValue::Number(10.0000005), &CellValue::Number(10.0)));
    }

    #[test]
    fn null_source_never_differs() {
        let v = validator();
        assert!(!v.values_differ(&CellValue::Null, &CellValue::Number(5.0)));
        assert!(!v.values_differ(&CellValue::Null, &CellValue::from("x")));
        assert!(!v.values_differ(&CellValue::Null, &CellValue::Null));
    }

    #[test]
    fn present_values_use_strict_inequality() {
        let v = validator();
        assert!(v.values_differ(&CellValue::from("a"), &CellValue::from("b")));
        assert!(v.values_differ(&CellValue::from("a"), &CellValue::Null));
        assert!(v.values_differ(&CellValue::Number(1.0), &CellValue::from("1")));
        assert!(!v.values_differ(&CellValue::from("a"), &CellValue::from("a")));
    }

    #[test]
    fn text_columns_compare_text_forms() {
        let v = validator();
        // a BOOLEAN or DATE column hands back 1 for a written '1'
        assert!(!v.column_values_differ("Flag", &CellValue::from("1"), &CellValue::Number(1.0)));
        assert!(!v.column_values_differ("Flag", &CellValue::Null, &CellValue::Number(1.0)));
        assert!(v.column_values_differ("Flag", &CellValue::from("0"), &CellValue::Number(1.0)));
        assert!(v.column_values_differ("Flag", &CellValue::from("1"), &CellValue::Null));
        // numeric columns keep tolerance semantics
        assert!(!v.column_values_differ(
            "Temperature",
            &CellValue::Number(10.0000005),
            &CellValue::Number(10.0)
        ));
        assert!(v.column_values_differ("Temperature", &CellValue::Number(1.0), &CellValue::from("1")));
    }

    #[test]
    fn coerce_cell_rules() {
        assert_eq!(coerce_cell(&CellValue::from(" 12.5 ")), Ok(CellValue::Number(12.5)));
        assert_eq!(coerce_cell(&CellValue::from("1e3")), Ok(CellValue::Number(1000.0)));
        assert_eq!(coerce_cell(&CellValue::from("   ")), Ok(CellValue::Null));
        assert_eq!(coerce_cell(&CellValue::Null), Ok(CellValue::Null));
        assert_eq!(coerce_cell(&CellValue::from("abc")), Err(()));
        assert_eq!(coerce_cell(&CellValue::from("NaN")), Err(()));
        assert_eq!(coerce_cell(&CellValue::from("inf")), Err(()));
    }

    #[test]
    fn coercion_failure_records_error_and_nulls_cell() {
        let v = validator();
        let columns = vec!["Temperature".to_string(), "Description".to_string()];
        let mut rows = vec![
            row(
                "T-100",
                &[
                    ("Temperature", CellValue::from("abc")),
                    ("Description", CellValue::from("not checked")),
                ],
            ),
            row("T-101", &[("Temperature", CellValue::from(" 42 "))]),
            row("T-102", &[("Temperature", CellValue::from(""))]),
        ];

        let errors = v.coerce_numeric("Sensors", &columns, &mut rows);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].sheet, "Sensors");
        assert_eq!(errors[0].record_key, "T-100");
        assert_eq!(errors[0].header, "Temperature");
        assert_eq!(errors[0].invalid_value, "abc");
        assert_eq!(errors[0].reason, ValidationReason::TypeMismatch);
        assert_eq!(rows[0].1["Temperature"], CellValue::Null);
        assert_eq!(rows[0].1["Description"], CellValue::from("not checked"));
        assert_eq!(rows[1].1["Temperature"], CellValue::Number(42.0));
        assert_eq!(rows[2].1["Temperature"], CellValue::Null);
    }

    #[test]
    fn non_numeric_columns_are_left_alone() {
        let v = validator();
        let columns = vec!["Description".to_string()];
        let mut rows = vec![row("T-1", &[("Description", CellValue::from("abc"))])];
        assert!(v.coerce_numeric("Sensors", &columns, &mut rows).is_empty());
    }
}
