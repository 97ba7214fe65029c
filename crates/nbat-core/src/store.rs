use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{ScheduleError, ScheduleResult};

/// The five persisted collections. Each is stored as one JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Posts,
    Discounts,
    Offers,
    Slots,
    Bookings,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Posts,
        Collection::Discounts,
        Collection::Offers,
        Collection::Slots,
        Collection::Bookings,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Collection::Posts => "clinic_posts",
            Collection::Discounts => "clinic_discounts",
            Collection::Offers => "clinic_offers",
            Collection::Slots => "clinic_slots",
            Collection::Bookings => "clinic_bookings",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Discounts => "discounts",
            Collection::Offers => "offers",
            Collection::Slots => "slots",
            Collection::Bookings => "bookings",
        }
    }
}

pub trait KeyValueStore {
    /// `Ok(None)` when nothing has been stored under `key` yet.
    fn read_raw(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Replaces the whole value stored under `key`.
    fn write_raw(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Reads a collection, treating missing, unreadable or malformed data as
/// empty.
#[tracing::instrument(skip(store), fields(collection = collection.name()))]
pub fn read_collection<T, S>(store: &S, collection: Collection) -> Vec<T>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let raw = match store.read_raw(collection.key()) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed reading collection; treating as empty");
            return Vec::new();
        }
    };

    match decode_collection(collection, &raw) {
        Ok(items) => {
            debug!(count = items.len(), "loaded collection");
            items
        }
        Err(err) => {
            warn!(error = %err, "stored collection is corrupt; treating as empty");
            Vec::new()
        }
    }
}

fn decode_collection<T: DeserializeOwned>(collection: Collection, raw: &str) -> ScheduleResult<Vec<T>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(|source| ScheduleError::StorageCorrupt {
        collection: collection.name(),
        source,
    })
}

#[tracing::instrument(skip(store, items), fields(collection = collection.name(), count = items.len()))]
pub fn write_collection<T, S>(store: &mut S, collection: Collection, items: &[T]) -> ScheduleResult<()>
where
    T: Serialize,
    S: KeyValueStore + ?Sized,
{
    let storage_err = |source: Box<dyn std::error::Error + Send + Sync + 'static>| ScheduleError::Storage {
        collection: collection.name(),
        source,
    };

    let serialized = serde_json::to_string(items).map_err(|err| storage_err(Box::new(err)))?;
    store
        .write_raw(collection.key(), &serialized)
        .map_err(|err| storage_err(err.into()))?;
    debug!("wrote collection");
    Ok(())
}

/// One `<key>.json` file per collection under a data directory.
#[derive(Debug)]
pub struct JsonFileStore {
    pub data_dir: PathBuf,
}

impl JsonFileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let store = Self { data_dir };
        for collection in Collection::ALL {
            let path = store.path_for(collection.key());
            if !path.exists() {
                fs::write(&path, "[]")
                    .with_context(|| format!("failed to initialise {}", path.display()))?;
            }
        }

        info!(data_dir = %store.data_dir.display(), "opened json store");
        Ok(store)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn read_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    fn write_raw(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        debug!(file = %path.display(), bytes = value.len(), "saving collection atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }
}

/// In-process store, used by tests and by callers that never persist.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write_raw(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn missing_collection_reads_empty() {
        let store = MemoryStore::new();
        let items: Vec<Value> = read_collection(&store, Collection::Slots);
        assert!(items.is_empty());
    }

    #[test]
    fn corrupt_collection_reads_empty() {
        let mut store = MemoryStore::new();
        store
            .write_raw(Collection::Bookings.key(), "{not json")
            .expect("raw write");
        let items: Vec<Value> = read_collection(&store, Collection::Bookings);
        assert!(items.is_empty());

        store
            .write_raw(Collection::Bookings.key(), r#"{"an":"object"}"#)
            .expect("raw write");
        let items: Vec<Value> = read_collection(&store, Collection::Bookings);
        assert!(items.is_empty());
    }

    #[test]
    fn corrupt_payload_maps_to_storage_corrupt() {
        let err = decode_collection::<Value>(Collection::Offers, "[1,").expect_err("should fail");
        assert!(matches!(err, ScheduleError::StorageCorrupt { collection: "offers", .. }));
    }

    #[test]
    fn written_collection_reads_back() {
        let mut store = MemoryStore::new();
        write_collection(&mut store, Collection::Posts, &["a".to_string(), "b".to_string()])
            .expect("write");
        let items: Vec<String> = read_collection(&store, Collection::Posts);
        assert_eq!(items, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn collections_use_clinic_prefixed_keys() {
        let keys: Vec<&str> = Collection::ALL.iter().map(|c| c.key()).collect();
        assert_eq!(
            keys,
            ["clinic_posts", "clinic_discounts", "clinic_offers", "clinic_slots", "clinic_bookings"]
        );
    }
}
