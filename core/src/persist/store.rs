use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistError;

type Map = BTreeMap<String, serde_json::Value>;

/// File-backed key→value store.
///
/// The whole store is one JSON object, loaded lazily on first access and
/// rewritten atomically (temp file, then rename) on every `set`. Access is
/// serialized internally; concurrent writers to the *same key* within one
/// run remain a caller responsibility.
pub struct Persist {
    path: PathBuf,
    state: Mutex<Option<Map>>,
}

impl Persist {
    /// Open a store at `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    /// The conventional store location for an application:
    /// `<user cache dir>/<app>/persist.json`.
    pub fn default_location(app: &str) -> PathBuf {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        base.join(app).join("persist.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value. Absent keys yield `Ok(None)`.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, PersistError> {
        let mut state = lock(&self.state);
        let map = self.loaded(&mut state)?;
        match map.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| PersistError::Decode {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Write or overwrite a value. Durable once this returns.
    pub fn set<V: Serialize>(&self, key: &str, value: &V) -> Result<(), PersistError> {
        let encoded = serde_json::to_value(value).map_err(|source| PersistError::Encode {
            key: key.to_string(),
            source,
        })?;

        let mut state = lock(&self.state);
        let map = self.loaded(&mut state)?;
        map.insert(key.to_string(), encoded);
        self.flush(map)
    }

    /// Remove a key. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), PersistError> {
        let mut state = lock(&self.state);
        let map = self.loaded(&mut state)?;
        if map.remove(key).is_some() {
            self.flush(map)?;
        }
        Ok(())
    }

    fn loaded<'a>(&self, state: &'a mut Option<Map>) -> Result<&'a mut Map, PersistError> {
        if state.is_none() {
            let map = match std::fs::read(&self.path) {
                Ok(bytes) => {
                    serde_json::from_slice(&bytes).map_err(|source| PersistError::Corrupt {
                        path: self.path.display().to_string(),
                        source,
                    })?
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
                Err(source) => {
                    return Err(PersistError::Io {
                        path: self.path.display().to_string(),
                        source,
                    })
                }
            };
            *state = Some(map);
        }
        Ok(state.get_or_insert_with(Map::new))
    }

    fn flush(&self, map: &Map) -> Result<(), PersistError> {
        let io_err = |source| PersistError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = serde_json::to_vec_pretty(map).map_err(|source| PersistError::Encode {
            key: String::new(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn roundtrip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = Persist::open(dir.path().join("persist.json"));

        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "C:/vs/bin;C:/windows".to_string());
        env.insert("INCLUDE".to_string(), "C:/vs/include".to_string());

        store.set("vs-env:amd64", &env).unwrap();
        let back: BTreeMap<String, String> = store.get("vs-env:amd64").unwrap().unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn absent_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Persist::open(dir.path().join("persist.json"));
        let missing: Option<String> = store.get("nothing-here").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn values_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.json");

        Persist::open(&path).set("ninja-version", &"1.10.2").unwrap();

        let reopened = Persist::open(&path);
        let value: String = reopened.get("ninja-version").unwrap().unwrap();
        assert_eq!(value, "1.10.2");
    }

    #[test]
    fn same_key_returns_most_recent_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = Persist::open(dir.path().join("persist.json"));

        store.set("k", &1u64).unwrap();
        store.set("k", &2u64).unwrap();
        assert_eq!(store.get::<u64>("k").unwrap(), Some(2));
    }

    #[test]
    fn remove_is_tolerant_and_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.json");
        let store = Persist::open(&path);

        store.remove("absent").unwrap();
        store.set("k", &"v").unwrap();
        store.remove("k").unwrap();

        let reopened = Persist::open(&path);
        assert_eq!(reopened.get::<String>("k").unwrap(), None);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.json");
        Persist::open(&path).set("k", &"v").unwrap();
        assert!(path.is_file());
        assert!(!path.with_extension("json.tmp").exists());
    }
}
