//! Local dictionary tier: curated term → meaning pairs.
//!
//! The dictionary is seeded once per install from a JSON asset and then
//! served from persistent storage, guarded by a version tag so a future
//! asset format change can trigger a re-seed. Lookups are exact-match.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::{Storage, StorageError};

/// Storage key holding the seeded term map.
pub const DICT_KEY: &str = "__jargon_local_dict";
/// Storage key holding the dictionary format version.
pub const DICT_VERSION_KEY: &str = "__jargon_local_dict_version";
/// Current dictionary format version.
pub const DICT_VERSION: &str = "v1";

/// One dictionary record as it appears in the JSON asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub term: String,
    pub meaning_line: String,
}

#[derive(Debug)]
pub enum DictionaryError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Storage(StorageError),
}

impl std::fmt::Display for DictionaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DictionaryError::Io(e) => write!(f, "dictionary IO error: {e}"),
            DictionaryError::Parse(e) => write!(f, "dictionary parse error: {e}"),
            DictionaryError::Storage(e) => write!(f, "dictionary storage error: {e}"),
        }
    }
}

impl From<std::io::Error> for DictionaryError {
    fn from(e: std::io::Error) -> Self {
        DictionaryError::Io(e)
    }
}

impl From<serde_json::Error> for DictionaryError {
    fn from(e: serde_json::Error) -> Self {
        DictionaryError::Parse(e)
    }
}

impl From<StorageError> for DictionaryError {
    fn from(e: StorageError) -> Self {
        DictionaryError::Storage(e)
    }
}

/// In-memory view of the seeded dictionary.
pub struct LocalDictionary {
    terms: HashMap<String, String>,
}

impl LocalDictionary {
    /// Load the dictionary, seeding storage from the JSON asset on first run.
    /// Subsequent calls (and restarts) serve the persisted copy and never
    /// touch the asset again.
    pub fn load_once(storage: &Storage, asset_path: &Path) -> Result<Self, DictionaryError> {
        if let Some(terms) = storage.get::<HashMap<String, String>>(DICT_KEY)? {
            info!(terms = terms.len(), "local dictionary already seeded");
            return Ok(Self { terms });
        }

        let content = std::fs::read_to_string(asset_path)?;
        let entries: Vec<DictionaryEntry> = serde_json::from_str(&content)?;
        let mut terms = HashMap::with_capacity(entries.len());
        for entry in entries {
            terms.insert(entry.term, entry.meaning_line);
        }

        storage.set(DICT_KEY, &terms)?;
        storage.set(DICT_VERSION_KEY, &DICT_VERSION)?;
        info!(terms = terms.len(), path = %asset_path.display(), "local dictionary seeded");
        Ok(Self { terms })
    }

    /// Empty dictionary (fallback when the asset is missing or malformed).
    pub fn empty() -> Self {
        Self {
            terms: HashMap::new(),
        }
    }

    /// Build a dictionary directly from records, bypassing storage.
    pub fn from_entries(entries: Vec<DictionaryEntry>) -> Self {
        let mut terms = HashMap::with_capacity(entries.len());
        for entry in entries {
            terms.insert(entry.term, entry.meaning_line);
        }
        Self { terms }
    }

    /// Exact-match lookup.
    pub fn lookup(&self, term: &str) -> Option<&str> {
        self.terms.get(term).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_asset(entries: &[(&str, &str)]) -> std::path::PathBuf {
        let records: Vec<DictionaryEntry> = entries
            .iter()
            .map(|(t, m)| DictionaryEntry {
                term: t.to_string(),
                meaning_line: m.to_string(),
            })
            .collect();
        let path = std::env::temp_dir().join(format!("euneo_dict_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_first_load_seeds_storage_and_version() {
        let storage = Storage::open_in_memory().unwrap();
        let asset = write_asset(&[("갑분싸", "갑자기 분위기가 싸해짐")]);

        let dict = LocalDictionary::load_once(&storage, &asset).unwrap();
        assert_eq!(dict.lookup("갑분싸"), Some("갑자기 분위기가 싸해짐"));
        assert!(storage.contains(DICT_KEY).unwrap());
        assert_eq!(
            storage.get::<String>(DICT_VERSION_KEY).unwrap().as_deref(),
            Some(DICT_VERSION)
        );

        std::fs::remove_file(asset).unwrap();
    }

    #[test]
    fn test_second_load_serves_storage_without_the_asset() {
        let storage = Storage::open_in_memory().unwrap();
        let asset = write_asset(&[("인싸", "무리에 잘 어울리는 사람")]);
        LocalDictionary::load_once(&storage, &asset).unwrap();
        std::fs::remove_file(&asset).unwrap();

        // asset is gone; the persisted copy must still satisfy the load
        let dict = LocalDictionary::load_once(&storage, &asset).unwrap();
        assert_eq!(dict.lookup("인싸"), Some("무리에 잘 어울리는 사람"));
    }

    #[test]
    fn test_missing_asset_is_an_io_error() {
        let storage = Storage::open_in_memory().unwrap();
        let bogus = std::env::temp_dir().join("euneo_no_such_asset.json");
        let result = LocalDictionary::load_once(&storage, &bogus);
        assert!(matches!(result, Err(DictionaryError::Io(_))));
    }

    #[test]
    fn test_malformed_asset_is_a_parse_error() {
        let storage = Storage::open_in_memory().unwrap();
        let path = std::env::temp_dir().join(format!("euneo_bad_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();
        let result = LocalDictionary::load_once(&storage, &path);
        assert!(matches!(result, Err(DictionaryError::Parse(_))));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_lookup_is_exact_match_only() {
        let dict = LocalDictionary::from_entries(vec![DictionaryEntry {
            term: "갓생".into(),
            meaning_line: "부지런하고 모범적인 삶".into(),
        }]);
        assert_eq!(dict.lookup("갓생"), Some("부지런하고 모범적인 삶"));
        assert_eq!(dict.lookup("갓생살기"), None);
        assert_eq!(dict.lookup(" 갓생"), None);
    }
}
