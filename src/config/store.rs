// src/config/store.rs

//! Per-project configuration holder.
//!
//! Every component that reads or mutates a project's `alertinfo.cfg` goes
//! through a [`ProjectConfigStore`] instead of re-reading the file. Updates
//! are serialized by the store's lock and persisted before the in-memory
//! state changes, so readers never see a value that is not on disk.

use std::fmt::Debug;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::loader::load_alert_info;
use crate::config::project::AlertInfo;
use crate::errors::{NanocasError, Result};

/// Abstract holder of one project's configuration.
pub trait ProjectConfigStore: Send + Sync + Debug {
    /// Current configuration.
    fn snapshot(&self) -> AlertInfo;

    /// Apply `apply` to a copy of the configuration, persist it, then make it
    /// current. Returns the new configuration.
    fn update(&self, apply: &mut dyn FnMut(&mut AlertInfo)) -> Result<AlertInfo>;
}

/// Configuration backed by a JSON file, replaced atomically on every update.
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    state: Mutex<AlertInfo>,
}

impl JsonConfigStore {
    /// Open an existing configuration file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let info = load_alert_info(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(info),
        })
    }

    /// Open the configuration file, or start from `fallback` when it does not
    /// exist yet. Nothing is written until the first update.
    pub fn open_or(path: impl Into<PathBuf>, fallback: AlertInfo) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            return Self::open(path);
        }
        debug!(?path, "project configuration not found; starting from defaults");
        Ok(Self {
            path,
            state: Mutex::new(fallback),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProjectConfigStore for JsonConfigStore {
    fn snapshot(&self) -> AlertInfo {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut AlertInfo)) -> Result<AlertInfo> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| NanocasError::config("project configuration lock poisoned"))?;

        let mut next = guard.clone();
        apply(&mut next);
        write_atomically(&self.path, &serde_json::to_vec_pretty(&next)?)?;

        *guard = next.clone();
        Ok(next)
    }
}

/// Configuration held in memory only (tests, dry runs).
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: Mutex<AlertInfo>,
}

impl MemoryConfigStore {
    pub fn new(info: AlertInfo) -> Self {
        Self {
            state: Mutex::new(info),
        }
    }
}

impl ProjectConfigStore for MemoryConfigStore {
    fn snapshot(&self) -> AlertInfo {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, apply: &mut dyn FnMut(&mut AlertInfo)) -> Result<AlertInfo> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| NanocasError::config("project configuration lock poisoned"))?;
        apply(&mut guard);
        Ok(guard.clone())
    }
}

/// Run [`ProjectConfigStore::update`] on the blocking pool.
///
/// Returns the new configuration together with what `apply` produced.
pub async fn update_blocking<T, F>(
    store: Arc<dyn ProjectConfigStore>,
    mut apply: F,
) -> Result<(AlertInfo, T)>
where
    F: FnMut(&mut AlertInfo) -> T + Send + 'static,
    T: Default + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut output = T::default();
        let info = store.update(&mut |info: &mut AlertInfo| output = apply(info))?;
        Ok::<_, NanocasError>((info, output))
    })
    .await
    .map_err(|e| NanocasError::Other(e.into()))?
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::project::Query;

    #[test]
    fn update_persists_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alertinfo.cfg");
        fs::write(&path, r#"{"projectId":"p1","queries":[{"name":"kpc","threshold":"5"}]}"#)
            .unwrap();

        let store = JsonConfigStore::open(&path).unwrap();
        store
            .update(&mut |info| info.queries[0].current_value = Some(7.5))
            .unwrap();

        let reopened = JsonConfigStore::open(&path).unwrap();
        assert_eq!(reopened.snapshot().queries[0].current_value, Some(7.5));
        assert!(!dir.path().join("alertinfo.cfg.tmp").exists());
    }

    #[test]
    fn open_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        match JsonConfigStore::open(dir.path().join("alertinfo.cfg")) {
            Err(NanocasError::ConfigError(msg)) => assert!(msg.contains("missing")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_blocking_returns_the_closure_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alertinfo.cfg");
        let store: Arc<dyn ProjectConfigStore> =
            Arc::new(JsonConfigStore::open_or(&path, AlertInfo::default()).unwrap());

        let (info, count) = update_blocking(Arc::clone(&store), |info: &mut AlertInfo| {
            info.queries.push(Query::new("kpc", 3.0));
            info.queries.len()
        })
        .await
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(info, store.snapshot());
        assert_eq!(JsonConfigStore::open(&path).unwrap().snapshot(), info);
    }

    #[test]
    fn open_or_does_not_write_until_updated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alertinfo.cfg");
        let store = JsonConfigStore::open_or(&path, AlertInfo::default()).unwrap();
        assert!(!path.exists());

        store
            .update(&mut |info| info.queries.push(Query::new("kpc", 3.0)))
            .unwrap();
        assert!(path.exists());
    }
}
