//! File-backed document store.
//!
//! One pretty-printed JSON delta per document, at `<data-dir>/<id>.json`.
//! Ids are percent-encoded into file names so any valid id maps to exactly
//! one file inside the data directory. Encoded names too long for the
//! filesystem become a readable prefix plus `~` and the id's SHA-256; `~` is
//! always percent-encoded, so the two forms never collide.

use collab_core::hub::{DocumentStore, Result};
use collab_core::{DocumentContent, DocumentId};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

/// Longest encoded stem used as-is. Leaves room for `.json` under the
/// common 255-byte file name limit.
const MAX_STEM_LEN: usize = 200;

/// Encoded characters kept in front of the digest.
const HASHED_PREFIX_LEN: usize = 64;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a document is stored.
    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id.as_str())))
    }
}

fn file_stem(id: &str) -> String {
    let stem = encode_stem(id);
    if stem.len() <= MAX_STEM_LEN {
        return stem;
    }

    let mut cut = HASHED_PREFIX_LEN;
    // Keep escapes whole
    while stem[..cut].ends_with('%') || stem[..cut - 1].ends_with('%') {
        cut -= 1;
    }
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    format!("{}~{}", &stem[..cut], hex::encode(hasher.finalize()))
}

fn encode_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for c in id.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            stem.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(stem, "%{:02X}", byte);
            }
        }
    }
    stem
}

impl DocumentStore for FileStore {
    fn load(&self, id: &DocumentId) -> Result<Option<DocumentContent>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        let content: DocumentContent = serde_json::from_str(&contents)?;
        Ok(Some(content))
    }

    fn save(&mut self, id: &DocumentId, content: &DocumentContent) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(content)?;
        fs::write(self.path_for(id), contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_core::hub::StoreError;
    use tempfile::TempDir;

    fn doc_id(s: &str) -> DocumentId {
        s.parse().unwrap()
    }

    #[test]
    fn test_missing_document_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        assert!(store.load(&doc_id("doc-1")).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut store = FileStore::open(temp.path()).unwrap();
        let content = DocumentContent::from_text("hello\n");

        store.save(&doc_id("doc-1"), &content).unwrap();

        assert_eq!(store.load(&doc_id("doc-1")).unwrap(), Some(content));
        let on_disk = fs::read_to_string(temp.path().join("doc-1.json")).unwrap();
        assert!(on_disk.contains("\"insert\": \"hello\\n\""));
    }

    #[test]
    fn test_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("data");
        FileStore::open(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_ids_cannot_escape_directory() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();

        let path = store.path_for(&doc_id("../etc/passwd"));

        assert_eq!(path.parent(), Some(temp.path()));
        assert_eq!(path.file_name().unwrap(), "%2E%2E%2Fetc%2Fpasswd.json");
    }

    #[test]
    fn test_distinct_ids_distinct_files() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        assert_ne!(store.path_for(&doc_id("a/b")), store.path_for(&doc_id("a_b")));
        assert_ne!(store.path_for(&doc_id("café")), store.path_for(&doc_id("cafe")));
    }

    #[test]
    fn test_longest_ids_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut store = FileStore::open(temp.path()).unwrap();
        let content = DocumentContent::from_text("hi");

        let plain = doc_id(&"a".repeat(256));
        let escaped = doc_id(&"/".repeat(256));
        for id in [&plain, &escaped] {
            store.save(id, &content).unwrap();
            assert_eq!(store.load(id).unwrap(), Some(content.clone()));

            let path = store.path_for(id);
            assert_eq!(path.parent(), Some(temp.path()));
            assert!(path.file_name().unwrap().len() <= 255);
        }
    }

    #[test]
    fn test_long_ids_sharing_a_prefix_stay_apart() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let a = doc_id(&format!("{}a", "x".repeat(250)));
        let b = doc_id(&format!("{}b", "x".repeat(250)));

        assert_ne!(store.path_for(&a), store.path_for(&b));
        assert!(store
            .path_for(&a)
            .to_str()
            .unwrap()
            .contains(&format!("{}~", "x".repeat(64))));
    }

    #[test]
    fn test_short_ids_keep_readable_names() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        let id = doc_id(&"a".repeat(200));
        assert_eq!(
            store.path_for(&id).file_name().unwrap().to_str().unwrap(),
            format!("{}.json", "a".repeat(200))
        );
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::open(temp.path()).unwrap();
        fs::write(store.path_for(&doc_id("doc-1")), "{not json").unwrap();

        assert!(matches!(
            store.load(&doc_id("doc-1")),
            Err(StoreError::Corrupt(_))
        ));
    }
}
