use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::storage::{KeyValueStorage, StorageError};

/// Storage key holding the encoded comment map.
pub const COMMENTS_KEY: &str = "comments";

#[derive(Debug, Error)]
pub enum CommentStoreError {
    #[error("stored comments under {key:?} are not a line → comments map: {source}")]
    Corrupt {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode comments: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Source line number → comments anchored to that line, in submission order.
///
/// Serializes as a JSON object with decimal string keys,
/// e.g. `{"12":["nice point","agreed"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentMap(BTreeMap<u32, Vec<String>>);

impl CommentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comments anchored at `line`; empty when the line has none.
    pub fn get(&self, line: u32) -> &[String] {
        self.0.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A copy of this map with `text` appended to `line`'s list.
    pub fn with_appended(&self, line: u32, text: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.0.entry(line).or_default().push(text.into());
        next
    }

    pub fn lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of comments across all lines.
    pub fn comment_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl From<BTreeMap<u32, Vec<String>>> for CommentMap {
    fn from(value: BTreeMap<u32, Vec<String>>) -> Self {
        Self(value)
    }
}

/// Reads the comment map stored under [`COMMENTS_KEY`].
///
/// A missing key is an empty map; a present value that does not decode is a
/// [`CommentStoreError::Corrupt`] error.
pub fn load(storage: &dyn KeyValueStorage) -> Result<CommentMap, CommentStoreError> {
    let Some(raw) = storage.get(COMMENTS_KEY)? else {
        return Ok(CommentMap::new());
    };

    serde_json::from_str(&raw).map_err(|source| CommentStoreError::Corrupt {
        key: COMMENTS_KEY,
        source,
    })
}

/// The authoritative comment map, written through to storage on every update.
pub struct CommentStore {
    map: CommentMap,
    storage: Box<dyn KeyValueStorage>,
    load_warning: Option<String>,
}

impl CommentStore {
    /// Loads comments from `storage`, starting from an empty map (and keeping a
    /// warning for the UI) when the stored value cannot be read.
    pub fn open(storage: Box<dyn KeyValueStorage>) -> Self {
        let (map, load_warning) = match load(storage.as_ref()) {
            Ok(map) => {
                info!(
                    "Loaded {} comments on {} lines",
                    map.comment_count(),
                    map.lines().count()
                );
                (map, None)
            }
            Err(e) => {
                warn!("Ignoring stored comments: {e}");
                (CommentMap::new(), Some(format!("Stored comments ignored: {e}")))
            }
        };

        Self {
            map,
            storage,
            load_warning,
        }
    }

    pub fn map(&self) -> &CommentMap {
        &self.map
    }

    pub fn comments_for(&self, line: u32) -> &[String] {
        self.map.get(line)
    }

    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    /// Replaces the in-memory map with `new_map` and persists it.
    ///
    /// The in-memory map is replaced even when persisting fails, so the
    /// caller's submission stays visible for the rest of the session.
    pub fn update(&mut self, new_map: CommentMap) -> Result<(), CommentStoreError> {
        let encoded = serde_json::to_string(&new_map).map_err(CommentStoreError::Encode)?;
        self.map = new_map;

        self.storage.set(COMMENTS_KEY, &encoded)?;
        debug!("Persisted {} bytes of comments", encoded.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};
    use tempfile::TempDir;

    fn store_with(raw: &str) -> CommentStore {
        CommentStore::open(Box::new(MemoryStorage::new().with_entry(COMMENTS_KEY, raw)))
    }

    #[test]
    fn test_absent_line_has_no_comments() {
        let store = store_with(r#"{"5":["a"]}"#);
        assert!(store.comments_for(4).is_empty());
        assert!(store.comments_for(6).is_empty());
        assert_eq!(store.comments_for(5), ["a".to_string()]);
    }

    #[test]
    fn test_load_without_key_is_empty() {
        let map = load(&MemoryStorage::new()).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_load_rejects_foreign_value() {
        let storage = MemoryStorage::new().with_entry(COMMENTS_KEY, r#"{"five":["a"]}"#);
        assert!(matches!(
            load(&storage),
            Err(CommentStoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_open_falls_back_to_empty_on_corrupt_value() {
        let store = store_with("definitely not json");
        assert!(store.map().is_empty());
        assert!(store.load_warning().is_some());
    }

    #[test]
    fn test_append_preserves_order_and_other_lines() {
        let map = CommentMap::from(BTreeMap::from([
            (2, vec!["other".to_string()]),
            (7, vec!["first".to_string()]),
        ]));

        let next = map.with_appended(7, "second");

        assert_eq!(next.get(7), ["first".to_string(), "second".to_string()]);
        assert_eq!(next.get(2), ["other".to_string()]);
        assert_eq!(next.lines().collect::<Vec<_>>(), vec![2, 7]);
        // the old map is untouched
        assert_eq!(map.get(7).len(), 1);
    }

    #[test]
    fn test_update_is_visible_after_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("storage.json");

        let mut store = CommentStore::open(Box::new(FileStorage::open(&path).unwrap()));
        let next = store.map().with_appended(12, "nice point");
        store.update(next).unwrap();
        let next = store.map().with_appended(12, "agreed");
        store.update(next).unwrap();

        let reloaded = load(&FileStorage::open(&path).unwrap()).unwrap();
        assert_eq!(
            reloaded.get(12),
            ["nice point".to_string(), "agreed".to_string()]
        );
    }

    #[test]
    fn test_persisted_layout_uses_string_line_keys() {
        let mut store = CommentStore::open(Box::new(MemoryStorage::new()));
        store
            .update(store.map().with_appended(12, "nice point"))
            .unwrap();

        let encoded = serde_json::to_string(store.map()).unwrap();
        assert_eq!(encoded, r#"{"12":["nice point"]}"#);
    }

    #[test]
    fn test_failed_write_keeps_comment_in_memory() {
        let mut store = CommentStore::open(Box::new(MemoryStorage::new().with_quota(8)));

        let result = store.update(store.map().with_appended(3, "too long to fit"));

        assert!(matches!(result, Err(CommentStoreError::Storage(_))));
        assert_eq!(store.comments_for(3), ["too long to fit".to_string()]);
    }
}
