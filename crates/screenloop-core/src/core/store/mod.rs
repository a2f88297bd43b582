//! Persistent table store backed by `redb`.
//!
//! The store holds one global candidate table plus, per screen, a metadata
//! record, a result table and a prediction table. Every public operation runs
//! in its own short transaction; nothing is held open between calls.

mod error;
mod population;
mod predictions;
mod results;
mod screens;

pub use error::StoreError;
pub use population::{ImportOptions, ImportSummary};
pub use predictions::{PredictionLoad, PredictionSink};
pub use results::UpsertSummary;

use redb::{Database, ReadOnlyTable, ReadTransaction, TableDefinition, TableError};
use redb::{Key, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const CANDIDATES: TableDefinition<u64, &[u8]> = TableDefinition::new("candidates");
const SCREENS: TableDefinition<&str, &[u8]> = TableDefinition::new("screens");

fn results_table_name(screen: &str) -> String {
    format!("results/{screen}")
}

fn predictions_table_name(screen: &str) -> String {
    format!("predictions/{screen}")
}

pub struct Store {
    db: Database,
    path: PathBuf,
}

impl Store {
    /// Opens the database at `path`, creating an empty one if necessary.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        debug!("Creating or opening store at {:?}", path);
        let db = Database::create(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Opens an existing database; fails if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::Missing(path.to_path_buf()));
        }
        debug!("Opening store at {:?}", path);
        let db = Database::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Opens a table for reading, treating a table that was never written as absent.
fn open_readable<K: Key + 'static, V: Value + 'static>(
    txn: &ReadTransaction,
    definition: TableDefinition<K, V>,
) -> Result<Option<ReadOnlyTable<K, V>>, StoreError> {
    match txn.open_table(definition) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn decode<T: serde::de::DeserializeOwned>(table: &str, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|source| StoreError::Encoding {
        table: table.to_string(),
        source,
    })
}

fn encode<T: serde::Serialize>(table: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|source| StoreError::Encoding {
        table: table.to_string(),
        source,
    })
}
