//! Store collaborator traits.
//!
//! The engine never owns a database handle. A `StoreConnector` opens one
//! `RecordStore` per run; the orchestrator drops it before returning.

use std::collections::{HashMap, HashSet};

use crate::error::SyncError;
use crate::model::{Changeset, Record};

/// Default number of keys bound per chunked fetch.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Column names of the target table, with the numeric subset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableColumns {
    pub all: Vec<String>,
    pub numeric: HashSet<String>,
}

impl TableColumns {
    pub fn contains(&self, column: &str) -> bool {
        self.all.iter().any(|c| c == column)
    }
}

pub trait RecordStore {
    /// Column names and numeric classification from the store catalog.
    fn introspect_columns(&mut self, table: &str) -> Result<TableColumns, SyncError>;

    /// Every trimmed, non-empty key currently in the table.
    fn fetch_all_keys(&mut self, table: &str, key_column: &str) -> Result<HashSet<String>, SyncError>;

    /// Records whose key is in `keys`, fetched `chunk_size` keys per query.
    /// Empty `keys` returns an empty result without querying.
    fn fetch_by_keys(
        &mut self,
        table: &str,
        key_column: &str,
        keys: &[String],
        chunk_size: usize,
    ) -> Result<Vec<Record>, SyncError>;

    /// Apply every non-empty changeset in one transaction. Returns rows affected.
    /// Any failure rolls back the whole batch.
    fn apply_changesets(
        &mut self,
        table: &str,
        key_column: &str,
        changesets: &[Changeset],
    ) -> Result<usize, SyncError>;
}

pub trait StoreConnector {
    /// Human-readable target, e.g. a file path. Must not contain secrets.
    fn describe(&self) -> String;

    fn connect(&self) -> Result<Box<dyn RecordStore>, SyncError>;
}

/// Index records by key, first match wins.
pub fn index_by_key<'a>(records: &'a [Record], key_column: &str) -> HashMap<String, &'a Record> {
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        if let Some(key) = record.get(key_column).and_then(|v| v.to_key()) {
            index.entry(key).or_insert(record);
        }
    }
    index
}
