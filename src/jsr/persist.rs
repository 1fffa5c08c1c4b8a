//! Load-on-open and write-temp-then-rename sync for the JSON registry.
//!
//! Grounded on `iwjsreg.c`'s `_load`/`iwjsreg_sync`, and on
//! `velesdb-core`'s `storage/compaction.rs` temp-file-then-`rename` atomic
//! replace idiom — the same commit pattern, reused here for the registry's
//! own atomic write.

use crate::error::{Error, Result};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// On-disk representation of the registry tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Pretty-printed JSON text.
    Text,
    /// `bincode`-serialized tree. Opaque to callers; round-trips the full
    /// `serde_json::Value`, including number-type distinctions that a
    /// text round-trip through a lossy parser could blur.
    Binary,
}

/// Loads the tree from `path`. A missing file is not an error: the registry
/// initializes to an empty object, matching `iwjsreg_open`'s `NOT_EXISTS`
/// handling.
pub fn load(path: &Path, format: Format) -> Result<Value> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Err(e) => return Err(Error::IoErrno(e)),
    };
    match format {
        Format::Text => serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidArgs(format!("malformed registry JSON: {e}"))),
        Format::Binary => bincode::deserialize(&bytes)
            .map_err(|e| Error::InvalidArgs(format!("malformed registry binary: {e}"))),
    }
}

/// Serializes `root` to `path_tmp`, flushes and data-syncs it, then renames
/// it over `path`. The rename is the atomic commit point — on any earlier
/// failure `path` is left untouched.
pub fn sync(path: &Path, path_tmp: &Path, root: &Value, format: Format) -> Result<()> {
    let mut file = File::create(path_tmp)?;
    match format {
        Format::Text => {
            serde_json::to_writer_pretty(&mut file, root)
                .map_err(|e| Error::Io(e.to_string()))?;
        }
        Format::Binary => {
            let bytes = bincode::serialize(root).map_err(|e| Error::Io(e.to_string()))?;
            file.write_all(&bytes)?;
        }
    }
    file.flush()?;
    file.sync_data()?;
    drop(file);
    std::fs::rename(path_tmp, path)?;
    Ok(())
}

/// Derives the sibling temp-file path used during [`sync`], `"{path}.tmp"`.
pub fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
