use super::{SCREENS, Store, StoreError, decode, encode, open_readable};
use redb::ReadableTable;
use serde::Serialize;
use serde::de::DeserializeOwned;

impl Store {
    /// Loads the metadata record persisted for `screen`, if any.
    pub fn load_screen<T: DeserializeOwned>(&self, screen: &str) -> Result<Option<T>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, SCREENS)? else {
            return Ok(None);
        };
        match table.get(screen)? {
            Some(guard) => Ok(Some(decode("screens", guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn save_screen<T: Serialize>(&self, screen: &str, record: &T) -> Result<(), StoreError> {
        let bytes = encode("screens", record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SCREENS)?;
            table.insert(screen, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn screen_names(&self) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read()?;
        let Some(table) = open_readable(&txn, SCREENS)? else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for entry in table.iter()? {
            let (key, _) = entry?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }
}
