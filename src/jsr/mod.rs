//! JSON Registry — a persistent JSON object tree with path- and key-based
//! accessors, merge-patch mutation, and atomic-replace persistence.
//!
//! Grounded on `iwjsreg.c`'s full operation set. The source's `jbl_node`
//! tree plus string pool is realized here as a plain owned
//! `serde_json::Value`: Rust ownership makes the pool/visitor-destructor
//! split the source needs unnecessary.

pub mod coerce;
pub mod lock;
pub mod merge_patch;
pub mod persist;
pub mod pointer;

pub use lock::LockAdapter;
pub use persist::Format;

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Options controlling how a [`JsonRegistry`] is opened.
pub struct JsrOpts {
    pub path: PathBuf,
    pub path_tmp: Option<PathBuf>,
    pub format: Format,
    pub readonly: bool,
    pub autosync: bool,
    pub lock: LockAdapter,
}

impl JsrOpts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            path_tmp: None,
            format: Format::Text,
            readonly: false,
            autosync: false,
            lock: LockAdapter::default(),
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    pub fn autosync(mut self) -> Self {
        self.autosync = true;
        self
    }

    pub fn with_lock(mut self, lock: LockAdapter) -> Self {
        self.lock = lock;
        self
    }
}

struct State {
    root: Value,
    path: PathBuf,
    path_tmp: PathBuf,
    format: Format,
    readonly: bool,
    autosync: bool,
    dirty: bool,
}

struct Inner {
    state: RwLock<State>,
    lock_adapter: LockAdapter,
}

/// A persistent JSON object tree, mutated in memory and flushed to disk by
/// atomic replace.
///
/// Cloning a `JsonRegistry` shares the same underlying tree and lock (an
/// `Arc`), mirroring the source's reference-counted instance: the last clone
/// dropped is what actually tears the registry down.
#[derive(Clone)]
pub struct JsonRegistry {
    inner: Arc<Inner>,
}

impl JsonRegistry {
    /// Opens (or initializes, if absent) the registry at `opts.path`.
    pub fn open(opts: JsrOpts) -> Result<Self> {
        let root = persist::load(&opts.path, opts.format)?;
        let path_tmp = opts
            .path_tmp
            .unwrap_or_else(|| persist::tmp_path_for(&opts.path));
        tracing::debug!(path = %opts.path.display(), "opened json registry");
        Ok(Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State {
                    root,
                    path: opts.path,
                    path_tmp,
                    format: opts.format,
                    readonly: opts.readonly,
                    autosync: opts.autosync,
                    dirty: false,
                }),
                lock_adapter: opts.lock,
            }),
        })
    }

    /// Final sync (unless read-only), then drops this handle's reference.
    pub fn close(self) -> Result<()> {
        if !self.inner.state.read().readonly {
            self.sync()?;
        }
        Ok(())
    }

    fn with_read<R>(&self, f: impl FnOnce(&State) -> Result<R>) -> Result<R> {
        match &self.inner.lock_adapter {
            LockAdapter::Owned(lock) | LockAdapter::Shared(lock) => {
                let _guard = lock.read();
                f(&self.inner.state.read())
            }
            LockAdapter::External { rlock, unlock, .. } => {
                rlock();
                let r = f(&self.inner.state.read());
                unlock();
                r
            }
        }
    }

    fn with_write<R>(&self, f: impl FnOnce(&mut State) -> Result<R>) -> Result<R> {
        match &self.inner.lock_adapter {
            LockAdapter::Owned(lock) | LockAdapter::Shared(lock) => {
                let _guard = lock.write();
                f(&mut self.inner.state.write())
            }
            LockAdapter::External { wlock, unlock, .. } => {
                wlock();
                let r = f(&mut self.inner.state.write());
                unlock();
                r
            }
        }
    }

    /// Writes the tree to disk if it is dirty; a no-op otherwise.
    ///
    /// An extra `Arc` clone is held across the (unlocked) I/O, mirroring the
    /// source's refcount bump before releasing the lock for a long-running
    /// write — the registry cannot be torn down by another thread's `close`
    /// while its own sync is in flight.
    pub fn sync(&self) -> Result<()> {
        let _keep_alive = self.inner.clone();
        let snapshot = self.with_write(|state| {
            if !state.dirty {
                return Ok(None);
            }
            Ok(Some((state.root.clone(), state.path.clone(), state.path_tmp.clone(), state.format)))
        })?;
        let Some((root, path, path_tmp, format)) = snapshot else {
            return Ok(());
        };
        persist::sync(&path, &path_tmp, &root, format)?;
        self.with_write(|state| {
            state.dirty = false;
            Ok(())
        })
    }

    fn mutate(&self, f: impl FnOnce(&mut Value) -> Result<()>) -> Result<()> {
        let autosync = self.with_write(|state| {
            if state.readonly {
                return Err(Error::Readonly);
            }
            f(&mut state.root)?;
            state.dirty = true;
            Ok(state.autosync)
        })?;
        if autosync {
            self.sync()?;
        }
        Ok(())
    }

    fn root_object_mut(root: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
        root.as_object_mut()
            .ok_or(Error::InvalidState)
    }

    pub fn set_str(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let value = Value::String(value.into());
        self.mutate(|root| {
            Self::root_object_mut(root)?.insert(key.to_string(), value);
            Ok(())
        })
    }

    pub fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.mutate(|root| {
            Self::root_object_mut(root)?.insert(key.to_string(), Value::from(value));
            Ok(())
        })
    }

    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.mutate(|root| {
            Self::root_object_mut(root)?.insert(key.to_string(), Value::Bool(value));
            Ok(())
        })
    }

    /// Atomically increments the top-level integer at `key` by `delta`,
    /// coercing a non-integer existing value to `0` first, and returns the
    /// post-increment value.
    pub fn inc_i64(&self, key: &str, delta: i64) -> Result<i64> {
        let mut result = 0i64;
        self.mutate(|root| {
            let obj = Self::root_object_mut(root)?;
            let cur = match obj.get(key) {
                Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
                _ => 0,
            };
            result = cur + delta;
            obj.insert(key.to_string(), Value::from(result));
            Ok(())
        })?;
        Ok(result)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.mutate(|root| {
            Self::root_object_mut(root)?.remove(key);
            Ok(())
        })
    }

    /// Applies an RFC 7386 merge patch at the JSON Pointer `path`.
    pub fn merge(&self, path: &str, node: Value) -> Result<()> {
        self.mutate(|root| merge_patch::apply_at(root, path, &node))
    }

    pub fn merge_str(&self, path: &str, value: impl Into<String>) -> Result<()> {
        self.merge(path, Value::String(value.into()))
    }

    pub fn merge_i64(&self, path: &str, value: i64) -> Result<()> {
        self.merge(path, Value::from(value))
    }

    pub fn merge_f64(&self, path: &str, value: f64) -> Result<()> {
        self.merge(path, Value::from(value))
    }

    pub fn merge_bool(&self, path: &str, value: bool) -> Result<()> {
        self.merge(path, Value::Bool(value))
    }

    pub fn merge_remove(&self, path: &str) -> Result<()> {
        self.mutate(|root| pointer::remove(root, path).map(|_| ()))
    }

    /// Deletes the subtree at `path` (or clears the root object's children
    /// when `path` addresses the root), then merge-patches `node` in.
    pub fn replace(&self, path: &str, node: Value) -> Result<()> {
        self.mutate(|root| {
            let is_root = path.is_empty();
            if is_root {
                Self::root_object_mut(root)?.clear();
            } else {
                match pointer::remove(root, path) {
                    Ok(_) | Err(Error::PathNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            merge_patch::apply_at(root, path, &node)
        })
    }

    fn get_exact<T>(&self, key: &str, extract: impl Fn(&Value) -> Option<T>) -> Result<T> {
        self.with_read(|state| {
            let obj = state.root.as_object().ok_or(Error::InvalidState)?;
            match obj.get(key) {
                Some(v) => extract(v).ok_or_else(|| {
                    tracing::debug!(key, "get: key present with incompatible type");
                    Error::NotExists(key.to_string())
                }),
                None => {
                    tracing::debug!(key, "get: key absent");
                    Err(Error::NotExists(key.to_string()))
                }
            }
        })
    }

    pub fn get_str(&self, key: &str) -> Result<String> {
        self.get_exact(key, |v| v.as_str().map(str::to_string))
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.get_exact(key, |v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get_exact(key, |v| v.as_bool())
    }

    pub fn at_i64(&self, path: &str) -> Result<i64> {
        self.with_read(|state| coerce::to_i64(pointer::resolve(&state.root, path)?))
    }

    pub fn at_f64(&self, path: &str) -> Result<f64> {
        self.with_read(|state| coerce::to_f64(pointer::resolve(&state.root, path)?))
    }

    pub fn at_bool(&self, path: &str) -> Result<bool> {
        self.with_read(|state| coerce::to_bool(pointer::resolve(&state.root, path)?))
    }

    pub fn at_str(&self, path: &str) -> Result<String> {
        self.with_read(|state| coerce::to_str(pointer::resolve(&state.root, path)?))
    }

    /// Deep-clones the subtree at `path`, or the whole tree when `path` is
    /// `None`.
    pub fn copy(&self, path: Option<&str>) -> Result<Value> {
        self.with_read(|state| match path {
            None => Ok(state.root.clone()),
            Some(p) => pointer::resolve(&state.root, p).cloned(),
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.read().dirty
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.state.read().readonly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn set_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.set_str("name", "x").unwrap();
        reg.set_i64("n", 42).unwrap();
        assert_eq!(reg.get_str("name").unwrap(), "x");
        assert_eq!(reg.get_i64("n").unwrap(), 42);
    }

    #[test]
    fn get_on_missing_key_is_not_exists() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        assert!(matches!(reg.get_str("missing").unwrap_err(), Error::NotExists(_)));
    }

    #[test]
    fn get_on_wrong_type_is_not_exists() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.set_i64("n", 1).unwrap();
        assert!(matches!(reg.get_str("n").unwrap_err(), Error::NotExists(_)));
    }

    #[test]
    fn inc_i64_accumulates_and_round_trips_to_zero() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        assert_eq!(reg.inc_i64("c", 5).unwrap(), 5);
        assert_eq!(reg.inc_i64("c", 5).unwrap(), 10);
        assert_eq!(reg.inc_i64("c", -10).unwrap(), 0);
    }

    #[test]
    fn inc_i64_coerces_non_integer_existing_value_to_zero() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.set_str("c", "not a number").unwrap();
        assert_eq!(reg.inc_i64("c", 3).unwrap(), 3);
    }

    #[test]
    fn sync_writes_file_and_clears_dirty_then_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        let reg = JsonRegistry::open(JsrOpts::new(path.clone())).unwrap();
        reg.set_str("name", "x").unwrap();
        assert!(reg.is_dirty());
        reg.sync().unwrap();
        assert!(!reg.is_dirty());
        assert!(path.exists());
        assert!(!persist::tmp_path_for(&path).exists());
    }

    #[test]
    fn reopen_after_sync_reads_back_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        {
            let reg = JsonRegistry::open(JsrOpts::new(path.clone())).unwrap();
            reg.set_str("name", "x").unwrap();
            reg.set_i64("n", 42).unwrap();
            reg.close().unwrap();
        }
        let reg = JsonRegistry::open(JsrOpts::new(path)).unwrap();
        assert_eq!(reg.get_str("name").unwrap(), "x");
        assert_eq!(reg.get_i64("n").unwrap(), 42);
    }

    #[test]
    fn merge_patch_nested_value() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.merge("/a/b", json!(1)).unwrap();
        reg.merge("/a/c", json!(2)).unwrap();
        assert_eq!(reg.copy(Some("/a")).unwrap(), json!({"b": 1, "c": 2}));
    }

    #[test]
    fn merge_remove_deletes_nested_key() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.merge("/a/b", json!(1)).unwrap();
        reg.merge_remove("/a/b").unwrap();
        assert!(reg.copy(Some("/a/b")).is_err());
    }

    #[test]
    fn replace_clears_subtree_before_merging() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.merge("/a", json!({"x": 1, "y": 2})).unwrap();
        reg.replace("/a", json!({"z": 3})).unwrap();
        assert_eq!(reg.copy(Some("/a")).unwrap(), json!({"z": 3}));
    }

    #[test]
    fn replace_root_clears_all_top_level_keys() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.set_str("old", "gone").unwrap();
        reg.replace("", json!({"fresh": true})).unwrap();
        assert!(reg.get_str("old").is_err());
        assert_eq!(reg.get_bool("fresh").unwrap(), true);
    }

    #[test]
    fn at_accessors_coerce_across_types() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        reg.set_i64("n", 7).unwrap();
        assert_eq!(reg.at_i64("/n").unwrap(), 7);
        assert_eq!(reg.at_f64("/n").unwrap(), 7.0);
        assert_eq!(reg.at_str("/n").unwrap(), "7");
        assert!(reg.at_bool("/n").unwrap());
    }

    #[test]
    fn readonly_registry_rejects_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        JsonRegistry::open(JsrOpts::new(path.clone())).unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(path).readonly()).unwrap();
        assert!(matches!(reg.set_str("a", "b").unwrap_err(), Error::Readonly));
    }

    #[test]
    fn autosync_flushes_to_disk_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        let reg = JsonRegistry::open(JsrOpts::new(path.clone()).autosync()).unwrap();
        reg.inc_i64("c", 1).unwrap();
        assert!(!reg.is_dirty());
        assert!(!persist::tmp_path_for(&path).exists());
    }

    #[test]
    fn shared_lock_adapter_uses_the_caller_supplied_lock() {
        let dir = tempdir().unwrap();
        let shared = Arc::new(RwLock::new(()));
        let reg = JsonRegistry::open(
            JsrOpts::new(dir.path().join("r.json")).with_lock(LockAdapter::shared(shared.clone())),
        )
        .unwrap();
        reg.set_str("name", "x").unwrap();
        assert_eq!(reg.get_str("name").unwrap(), "x");
        // The registry released the shared lock after each operation rather
        // than holding it, so the caller can still acquire it here.
        let _guard = shared.try_write().expect("registry must not hold the shared lock between calls");
    }

    #[test]
    fn cloned_handle_shares_state() {
        let dir = tempdir().unwrap();
        let reg = JsonRegistry::open(JsrOpts::new(dir.path().join("r.json"))).unwrap();
        let reg2 = reg.clone();
        reg.set_str("shared", "yes").unwrap();
        assert_eq!(reg2.get_str("shared").unwrap(), "yes");
    }
}
