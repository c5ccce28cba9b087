//! Durable single-slot storage for the current credential pair.
//!
//! `load` never fails: unreadable or corrupt records are logged, erased,
//! and reported as "no session". Write failures are returned to the caller,
//! which logs them; they never take down the in-memory session.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use crate::models::CredentialPair;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service and account for the single session slot
const KEYRING_SERVICE: &str = "aihub";
const KEYRING_ACCOUNT: &str = "session";

pub trait TokenStore: Send + Sync {
    /// Read the stored pair. Corrupt data is cleared and yields `None`.
    fn load(&self) -> Option<CredentialPair>;

    /// Replace the stored pair. Readers never observe a partial write.
    fn save(&self, pair: &CredentialPair) -> Result<()>;

    /// Erase the slot. Missing data is not an error.
    fn clear(&self);
}

/// Parse a stored record, clearing the slot when it is corrupt.
fn parse_record(store: &dyn TokenStore, backend: &str, contents: &str) -> Option<CredentialPair> {
    match serde_json::from_str::<CredentialPair>(contents) {
        Ok(pair) => Some(pair),
        Err(e) => {
            warn!(backend, error = %e, "Stored session is corrupt, clearing");
            store.clear();
            None
        }
    }
}

// ============================================================================
// File store
// ============================================================================

/// `session.json` in the application cache directory.
pub struct FileTokenStore {
    cache_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<CredentialPair> {
        let path = self.session_path();
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path) {
            Ok(contents) => parse_record(self, "file", &contents),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read session file, clearing");
                self.clear();
                None
            }
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).context("Failed to create cache directory")?;
        let contents = serde_json::to_string_pretty(pair)?;

        // Write beside the slot, then rename over it.
        let path = self.session_path();
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file =
                fs::File::create(&tmp_path).context("Failed to create temporary session file")?;
            file.write_all(contents.as_bytes())
                .context("Failed to write session file")?;
            file.sync_all().context("Failed to flush session file")?;
        }
        fs::rename(&tmp_path, &path).context("Failed to replace session file")?;
        debug!(path = %path.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) {
        let path = self.session_path();
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove session file");
            }
        }
    }
}

// ============================================================================
// OS keychain store
// ============================================================================

/// One entry in the OS keychain holding the JSON record.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }

    /// Use a custom service name, e.g. to keep dev and prod sessions apart.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, KEYRING_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<CredentialPair> {
        let entry = match self.entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                return None;
            }
        };
        match entry.get_password() {
            Ok(contents) => parse_record(self, "keyring", &contents),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read session from keychain, clearing");
                self.clear();
                None
            }
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        let contents = serde_json::to_string(pair)?;
        self.entry()?
            .set_password(&contents)
            .context("Failed to store session in keychain")?;
        debug!("Session saved to keychain");
        Ok(())
    }

    fn clear(&self) {
        match self.entry().map(|entry| entry.delete_credential()) {
            Ok(Ok(())) | Ok(Err(keyring::Error::NoEntry)) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to delete session from keychain"),
            Err(e) => warn!(error = %e, "Keychain unavailable"),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local slot holding the serialized record.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with a raw record, as if written by an earlier run.
    pub fn with_raw(contents: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(contents.into())),
        }
    }

    /// Raw record currently in the slot.
    pub fn raw(&self) -> Option<String> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<CredentialPair> {
        let contents = self.raw()?;
        parse_record(self, "memory", &contents)
    }

    fn save(&self, pair: &CredentialPair) -> Result<()> {
        let contents = serde_json::to_string(pair)?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("Session slot lock poisoned"))?;
        *slot = Some(contents);
        Ok(())
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> CredentialPair {
        CredentialPair::new("h.p.s", "refresh-1").unwrap()
    }

    #[test]
    fn test_file_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested"));
        store.save(&pair()).unwrap();
        assert_eq!(store.load(), Some(pair()));
        // No temp file left behind
        assert!(!dir.path().join("nested").join("session.json.tmp").exists());
    }

    #[test]
    fn test_file_clear_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.save(&pair()).unwrap();
        store.clear();
        assert_eq!(store.load(), None);
        // Clearing an empty slot is fine
        store.clear();
    }

    #[test]
    fn test_file_save_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        store.save(&pair()).unwrap();
        let next = CredentialPair::new("h.p2.s", "refresh-2").unwrap();
        store.save(&next).unwrap();
        assert_eq!(store.load(), Some(next));
    }

    #[test]
    fn test_file_corrupt_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        fs::write(&path, "{not json").unwrap();
        let store = FileTokenStore::new(dir.path().to_path_buf());
        assert_eq!(store.load(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_memory_partial_record_is_cleared() {
        let store = MemoryTokenStore::with_raw(r#"{"accessToken":"h.p.s"}"#);
        assert_eq!(store.load(), None);
        assert_eq!(store.raw(), None);
    }

    #[test]
    fn test_memory_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load(), None);
        store.save(&pair()).unwrap();
        assert_eq!(store.load(), Some(pair()));
        store.clear();
        assert_eq!(store.load(), None);
    }
}
