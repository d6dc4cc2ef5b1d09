use crate::error::StoreError;
use crate::market::Asset;
use serde::de::DeserializeOwned;
use serde::Serialize;

// Same keys the persisted state has always used.
pub const SELECTED_KEY: &str = "selectedCryptos";
pub const SNAPSHOT_KEY: &str = "allCryptos";
pub const DARK_MODE_KEY: &str = "darkMode";

/// Persistence gateway: typed load/save per entity over one sled tree.
///
/// Values are JSON. Anything missing or malformed loads as absent; corrupt
/// state is never surfaced to the user.
pub struct Store {
    db: sled::Db,
}

impl Store {
    pub fn open(path: &str) -> Result<Store, StoreError> {
        Ok(Store {
            db: sled::open(path)?,
        })
    }

    #[cfg(test)]
    pub fn temporary() -> Store {
        Store {
            db: sled::Config::new()
                .temporary(true)
                .open()
                .expect("temporary sled db"),
        }
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.db.get(key).ok().flatten()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.db.insert(key, serde_json::to_vec(value)?)?;
        // block until the write is stable on disk
        self.db.flush()?;
        Ok(())
    }

    pub fn load_selection(&self) -> Vec<String> {
        self.load_json(SELECTED_KEY).unwrap_or_default()
    }

    pub fn save_selection(&self, ids: &[String]) -> Result<(), StoreError> {
        self.save_json(SELECTED_KEY, ids)
    }

    /// Removes the persisted entry entirely rather than writing `[]`.
    pub fn clear_selection(&self) -> Result<(), StoreError> {
        self.db.remove(SELECTED_KEY)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn selection_persisted(&self) -> bool {
        self.db.contains_key(SELECTED_KEY).unwrap_or(false)
    }

    pub fn load_snapshot(&self) -> Option<Vec<Asset>> {
        self.load_json(SNAPSHOT_KEY)
    }

    pub fn save_snapshot(&self, snapshot: &[Asset]) -> Result<(), StoreError> {
        self.save_json(SNAPSHOT_KEY, snapshot)
    }

    pub fn load_dark_mode(&self) -> bool {
        self.load_json(DARK_MODE_KEY).unwrap_or(false)
    }

    pub fn save_dark_mode(&self, enabled: bool) -> Result<(), StoreError> {
        self.save_json(DARK_MODE_KEY, &enabled)
    }

    #[cfg(test)]
    fn insert_raw(&self, key: &str, bytes: &[u8]) {
        self.db.insert(key, bytes).unwrap();
    }
}
