use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::error::AuthError;
use super::token::{Credentials, TokenPair};

const SESSION_FILE_VERSION: u32 = 1;
const SESSION_FILE_NAME: &str = "session.toml";

/// The three durable entries the session keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    #[strum(serialize = "active_winery_id")]
    ActiveWinery,
}

/// Durable key-value persistence for session credentials.
///
/// Implementations hold opaque strings only; interpretation belongs to the
/// session and the tenant context.
pub trait CredentialStore: Send + Sync {
    fn load(&self, key: StoreKey) -> Result<Option<String>, AuthError>;
    fn save(&self, key: StoreKey, value: &str) -> Result<(), AuthError>;
    fn clear(&self, key: StoreKey) -> Result<(), AuthError>;

    fn credentials(&self) -> Result<Credentials, AuthError> {
        Ok(Credentials::new(
            self.load(StoreKey::AccessToken)?,
            self.load(StoreKey::RefreshToken)?,
        ))
    }

    /// Persist a token pair, keeping the stored refresh token when the pair has none.
    fn save_tokens(&self, tokens: &TokenPair) -> Result<(), AuthError> {
        self.save(StoreKey::AccessToken, &tokens.access)?;
        if let Some(refresh) = &tokens.refresh {
            self.save(StoreKey::RefreshToken, refresh)?;
        }
        Ok(())
    }

    fn clear_tokens(&self) -> Result<(), AuthError> {
        self.clear(StoreKey::AccessToken)?;
        self.clear(StoreKey::RefreshToken)
    }
}

/// Configuration for file-backed credential storage.
#[derive(Debug, Clone)]
pub struct CredentialStoreConfig {
    pub base_dir: PathBuf,
}

impl CredentialStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_cellar_dir()
    }
}

/// File-backed credential store using a single TOML file.
///
/// Values are cached after the first read; this process is assumed to be the
/// only writer.
///
/// # Example
/// ```no_run
/// use cellar::auth::{CredentialStore, FileCredentialStore, StoreKey};
///
/// let store = FileCredentialStore::new_default();
/// store.save(StoreKey::RefreshToken, "r1")?;
/// # Ok::<(), cellar::auth::AuthError>(())
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    cache: Mutex<Option<BTreeMap<String, String>>>,
    #[cfg(test)]
    writes: std::sync::atomic::AtomicUsize,
}

impl FileCredentialStore {
    pub fn new(config: CredentialStoreConfig) -> Self {
        Self {
            path: config.base_dir.join(SESSION_FILE_NAME),
            cache: Mutex::new(None),
            #[cfg(test)]
            writes: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn new_default() -> Self {
        Self::new(CredentialStoreConfig::new(default_cellar_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> Result<MutexGuard<'_, Option<BTreeMap<String, String>>>, AuthError> {
        let mut guard = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            *guard = Some(self.read_file()?);
        }
        Ok(guard)
    }

    fn read_file(&self) -> Result<BTreeMap<String, String>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: SessionFile = toml::from_str(&raw)?;
        if file.version != SESSION_FILE_VERSION {
            return Err(AuthError::UnsupportedVersion(file.version));
        }
        Ok(file.entries)
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
        let file = SessionFile {
            version: SESSION_FILE_VERSION,
            saved_at: Utc::now(),
            entries: entries.clone(),
        };
        let serialized = toml::to_string(&file)?;
        #[cfg(test)]
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        atomic_write(&self.path, serialized.as_bytes())
    }
}

impl FileCredentialStore {
    /// Apply `change` to a copy of the entries and write it in one atomic
    /// replace. Nothing is written when `change` reports no modification.
    fn update(
        &self,
        change: impl FnOnce(&mut BTreeMap<String, String>) -> bool,
    ) -> Result<(), AuthError> {
        let mut guard = self.entries()?;
        let mut next = guard.clone().unwrap_or_default();
        if !change(&mut next) {
            return Ok(());
        }
        self.write_file(&next)?;
        *guard = Some(next);
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, key: StoreKey) -> Result<Option<String>, AuthError> {
        let guard = self.entries()?;
        Ok(guard
            .as_ref()
            .and_then(|entries| entries.get(&key.to_string()).cloned()))
    }

    fn save(&self, key: StoreKey, value: &str) -> Result<(), AuthError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn clear(&self, key: StoreKey) -> Result<(), AuthError> {
        self.update(|entries| entries.remove(&key.to_string()).is_some())
    }

    fn save_tokens(&self, tokens: &TokenPair) -> Result<(), AuthError> {
        self.update(|entries| {
            entries.insert(StoreKey::AccessToken.to_string(), tokens.access.clone());
            if let Some(refresh) = &tokens.refresh {
                entries.insert(StoreKey::RefreshToken.to_string(), refresh.clone());
            }
            true
        })
    }

    fn clear_tokens(&self) -> Result<(), AuthError> {
        self.update(|entries| {
            let access = entries.remove(&StoreKey::AccessToken.to_string()).is_some();
            let refresh = entries.remove(&StoreKey::RefreshToken.to_string()).is_some();
            access || refresh
        })
    }
}

/// In-memory credential store, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given tokens.
    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        let store = Self::new();
        if let Some(access) = access {
            store.seed(StoreKey::AccessToken, access);
        }
        if let Some(refresh) = refresh {
            store.seed(StoreKey::RefreshToken, refresh);
        }
        store
    }

    pub fn seed(&self, key: StoreKey, value: &str) {
        self.lock().insert(key, value.to_string());
    }

    pub fn get(&self, key: StoreKey) -> Option<String> {
        self.lock().get(&key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StoreKey, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, key: StoreKey) -> Result<Option<String>, AuthError> {
        Ok(self.get(key))
    }

    fn save(&self, key: StoreKey, value: &str) -> Result<(), AuthError> {
        self.seed(key, value);
        Ok(())
    }

    fn clear(&self, key: StoreKey) -> Result<(), AuthError> {
        self.lock().remove(&key);
        Ok(())
    }

    fn save_tokens(&self, tokens: &TokenPair) -> Result<(), AuthError> {
        let mut entries = self.lock();
        entries.insert(StoreKey::AccessToken, tokens.access.clone());
        if let Some(refresh) = &tokens.refresh {
            entries.insert(StoreKey::RefreshToken, refresh.clone());
        }
        Ok(())
    }

    fn clear_tokens(&self) -> Result<(), AuthError> {
        let mut entries = self.lock();
        entries.remove(&StoreKey::AccessToken);
        entries.remove(&StoreKey::RefreshToken);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionFile {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: BTreeMap<String, String>,
}

fn default_cellar_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".cellar"))
        .unwrap_or_else(|| PathBuf::from(".cellar"))
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| AuthError::Io(format!("{} has no file name", path.display())))?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_name = format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileCredentialStore) {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(CredentialStoreConfig::new(dir.path().to_path_buf()));
        (dir, store)
    }

    #[test]
    fn entries_survive_a_reload() {
        let (dir, store) = temp_store();
        store
            .save_tokens(&TokenPair {
                access: "a1".to_string(),
                refresh: Some("r1".to_string()),
            })
            .unwrap();
        store.save(StoreKey::ActiveWinery, "w-1").unwrap();

        let reopened = FileCredentialStore::new(CredentialStoreConfig::new(dir.path().to_path_buf()));
        let creds = reopened.credentials().unwrap();
        assert_eq!(creds.access.as_deref(), Some("a1"));
        assert_eq!(creds.refresh.as_deref(), Some("r1"));
        assert_eq!(
            reopened.load(StoreKey::ActiveWinery).unwrap().as_deref(),
            Some("w-1")
        );
    }

    #[test]
    fn save_tokens_keeps_refresh_when_not_rotated() {
        let store = MemoryCredentialStore::with_tokens(Some("a1"), Some("r1"));
        store
            .save_tokens(&TokenPair {
                access: "a2".to_string(),
                refresh: None,
            })
            .unwrap();
        assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("a2"));
        assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("r1"));
    }

    #[test]
    fn clear_tokens_leaves_active_winery() {
        let (_dir, store) = temp_store();
        store.save(StoreKey::AccessToken, "a1").unwrap();
        store.save(StoreKey::RefreshToken, "r1").unwrap();
        store.save(StoreKey::ActiveWinery, "w-1").unwrap();

        store.clear_tokens().unwrap();

        assert!(store.credentials().unwrap().is_empty());
        assert!(store.load(StoreKey::ActiveWinery).unwrap().is_some());
    }

    #[test]
    fn token_pair_changes_in_one_file_write() {
        let (dir, store) = temp_store();
        store.save(StoreKey::ActiveWinery, "w-1").unwrap();
        let writes = || store.writes.load(std::sync::atomic::Ordering::SeqCst);
        let before = writes();

        store
            .save_tokens(&TokenPair {
                access: "a2".to_string(),
                refresh: Some("r2".to_string()),
            })
            .unwrap();
        assert_eq!(writes(), before + 1);

        let on_disk = FileCredentialStore::new(CredentialStoreConfig::new(dir.path().to_path_buf()));
        let creds = on_disk.credentials().unwrap();
        assert_eq!(creds.access.as_deref(), Some("a2"));
        assert_eq!(creds.refresh.as_deref(), Some("r2"));

        store.clear_tokens().unwrap();
        assert_eq!(writes(), before + 2);
        store.clear_tokens().unwrap();
        assert_eq!(writes(), before + 2);
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, store) = temp_store();
        store.clear(StoreKey::AccessToken).unwrap();
        store.clear_tokens().unwrap();
        store.clear_tokens().unwrap();
        assert!(store.credentials().unwrap().is_empty());
    }

    #[test]
    fn store_keys_use_stable_names() {
        assert_eq!(StoreKey::AccessToken.to_string(), "access_token");
        assert_eq!(StoreKey::RefreshToken.to_string(), "refresh_token");
        assert_eq!(StoreKey::ActiveWinery.to_string(), "active_winery_id");
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_private() {
        let (_dir, store) = temp_store();
        store.save(StoreKey::AccessToken, "a1").unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let (dir, store) = temp_store();
        fs::write(
            dir.path().join(SESSION_FILE_NAME),
            "version = 9\nsaved_at = \"2024-01-01T00:00:00Z\"\n[entries]\n",
        )
        .unwrap();
        assert!(matches!(
            store.load(StoreKey::AccessToken),
            Err(AuthError::UnsupportedVersion(9))
        ));
    }
}
