//! Extension-wide persistent store.
//!
//! A flat key-value store of JSON values, with a file backend (one
//! hex-encoded record per line) and an in-memory backend for ephemeral runs.
//! [`PersistedState`] is the typed view the coordinator reads and writes.

use nr_core::BlockEntry;
use nr_core::GuardError;
use nr_core::GuardResult;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

pub const KEY_ENABLED: &str = "enabled";
pub const KEY_TOTAL_BLOCKED: &str = "totalBlocked";
pub const KEY_SESSION_BLOCKED: &str = "sessionBlocked";
pub const KEY_RECENT_BLOCKS: &str = "recentBlocks";

const STORE_FILE_NAME: &str = "state.kv";

/// Durable storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Keep everything in memory; nothing survives the process.
    pub ephemeral_mode: bool,
    pub persistent_root: Option<PathBuf>,
}

impl StorageConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            ephemeral_mode: false,
            persistent_root: Some(root.into()),
        }
    }

    pub fn ephemeral() -> Self {
        Self {
            ephemeral_mode: true,
            persistent_root: None,
        }
    }

    /// Opens the backend this configuration selects.
    pub fn open(&self) -> GuardResult<Box<dyn KeyValueStore>> {
        if self.ephemeral_mode {
            return Ok(Box::new(MemoryStore::default()));
        }

        let root = self.persistent_root.as_ref().ok_or_else(|| {
            GuardError::new(
                "storage.persistence_unconfigured",
                "persistent storage root is not configured",
            )
        })?;
        Ok(Box::new(FileStore::open(root)?))
    }
}

/// Flat JSON key-value store.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> GuardResult<Option<Value>>;
    /// Writes all entries in one step.
    fn set_many(&mut self, entries: Vec<(String, Value)>) -> GuardResult<()>;
    fn remove(&mut self, key: &str) -> GuardResult<()>;
    fn clear(&mut self) -> GuardResult<()>;

    fn set(&mut self, key: &str, value: Value) -> GuardResult<()> {
        self.set_many(vec![(key.to_owned(), value)])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> GuardResult<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set_many(&mut self, entries: Vec<(String, Value)>) -> GuardResult<()> {
        self.values.extend(entries);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> GuardResult<()> {
        self.values.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> GuardResult<()> {
        self.values.clear();
        Ok(())
    }
}

/// File-backed store. The whole map is rewritten on every change.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl FileStore {
    pub fn open(root: &Path) -> GuardResult<Self> {
        let path = root.join(STORE_FILE_NAME);
        let values = read_store_map(&path)?;
        tracing::debug!(path = %path.display(), keys = values.len(), "store opened");
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> GuardResult<()> {
        if self.values.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|error| {
                    GuardError::new(
                        "storage.remove_failed",
                        format!(
                            "failed removing empty store file `{}`: {error}",
                            self.path.display()
                        ),
                    )
                })?;
            }
            return Ok(());
        }

        write_store_map(&self.path, &self.values)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> GuardResult<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set_many(&mut self, entries: Vec<(String, Value)>) -> GuardResult<()> {
        self.values.extend(entries);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> GuardResult<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> GuardResult<()> {
        self.values.clear();
        self.flush()
    }
}

/// Typed view over the store. Missing or malformed keys read as defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub enabled: bool,
    pub total_blocked: u64,
    pub session_blocked: u64,
    pub recent_blocks: Vec<BlockEntry>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            enabled: true,
            total_blocked: 0,
            session_blocked: 0,
            recent_blocks: Vec::new(),
        }
    }
}

impl PersistedState {
    pub fn load(store: &dyn KeyValueStore) -> GuardResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            enabled: read_or(store, KEY_ENABLED, defaults.enabled)?,
            total_blocked: read_or(store, KEY_TOTAL_BLOCKED, defaults.total_blocked)?,
            session_blocked: read_or(store, KEY_SESSION_BLOCKED, defaults.session_blocked)?,
            recent_blocks: read_or(store, KEY_RECENT_BLOCKS, defaults.recent_blocks)?,
        })
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> GuardResult<()> {
        store.set_many(vec![
            (KEY_ENABLED.to_owned(), Value::from(self.enabled)),
            (KEY_TOTAL_BLOCKED.to_owned(), Value::from(self.total_blocked)),
            (KEY_SESSION_BLOCKED.to_owned(), Value::from(self.session_blocked)),
            (KEY_RECENT_BLOCKS.to_owned(), to_value(&self.recent_blocks)?),
        ])
    }
}

fn read_or<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> GuardResult<T> {
    let Some(value) = store.get(key)? else {
        return Ok(default);
    };

    match serde_json::from_value(value) {
        Ok(parsed) => Ok(parsed),
        Err(error) => {
            tracing::warn!(key, %error, "stored value malformed, using default");
            Ok(default)
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> GuardResult<Value> {
    serde_json::to_value(value).map_err(|error| {
        GuardError::new(
            "storage.encode_failed",
            format!("failed to encode stored value: {error}"),
        )
    })
}

fn read_store_map(path: &Path) -> GuardResult<BTreeMap<String, Value>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path).map_err(|error| {
        GuardError::new(
            "storage.read_failed",
            format!("failed to read store file `{}`: {error}", path.display()),
        )
    })?;

    let mut map = BTreeMap::new();
    for (index, line) in content.lines().enumerate() {
        if line.is_empty() {
            continue;
        }

        let (key_hex, value_hex) = line.split_once('\t').ok_or_else(|| {
            GuardError::new(
                "storage.format_invalid",
                format!(
                    "invalid record format at `{}` line {}",
                    path.display(),
                    index + 1
                ),
            )
        })?;

        let key = decode_hex_string(key_hex)?;
        let raw = decode_hex_string(value_hex)?;
        let value = serde_json::from_str(&raw).map_err(|error| {
            GuardError::new(
                "storage.value_invalid",
                format!("stored value for `{key}` is not JSON: {error}"),
            )
        })?;
        map.insert(key, value);
    }

    Ok(map)
}

fn write_store_map(path: &Path, map: &BTreeMap<String, Value>) -> GuardResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            GuardError::new(
                "storage.dir_create_failed",
                format!(
                    "failed to create store directory `{}`: {error}",
                    parent.display()
                ),
            )
        })?;
    }

    let mut encoded = String::new();
    for (key, value) in map {
        encoded.push_str(&encode_hex_string(key));
        encoded.push('\t');
        encoded.push_str(&encode_hex_string(&value.to_string()));
        encoded.push('\n');
    }

    fs::write(path, encoded).map_err(|error| {
        GuardError::new(
            "storage.write_failed",
            format!("failed to write store file `{}`: {error}", path.display()),
        )
    })
}

fn encode_hex_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len().saturating_mul(2));
    for byte in value.as_bytes() {
        out.push(hex_char(byte >> 4));
        out.push(hex_char(byte & 0x0f));
    }
    out
}

fn decode_hex_string(value: &str) -> GuardResult<String> {
    let bytes = value.as_bytes();
    if !bytes.len().is_multiple_of(2) {
        return Err(GuardError::new(
            "storage.hex_invalid",
            "hex field length must be even",
        ));
    }

    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let high = decode_hex_nibble(pair[0])?;
        let low = decode_hex_nibble(pair[1])?;
        out.push((high << 4) | low);
    }

    String::from_utf8(out).map_err(|error| {
        GuardError::new(
            "storage.utf8_invalid",
            format!("store field is not valid UTF-8: {error}"),
        )
    })
}

fn hex_char(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        10..=15 => (b'a' + (value - 10)) as char,
        _ => '0',
    }
}

fn decode_hex_nibble(byte: u8) -> GuardResult<u8> {
    match byte {
        b'0'..=b'9' => Ok(byte - b'0'),
        b'a'..=b'f' => Ok(byte - b'a' + 10),
        b'A'..=b'F' => Ok(byte - b'A' + 10),
        _ => Err(GuardError::new(
            "storage.hex_invalid",
            format!("invalid hex character `{}`", char::from(byte)),
        )),
    }
}
