//! RFC 6901 JSON Pointer resolution over `serde_json::Value`.
//!
//! No dependency in the pack pairs pointer resolution with merge-patch over
//! `serde_json::Value` directly, so this is implemented locally — the same
//! spirit as the source keeping pointer/merge logic (`iwjson`) and the
//! registry (`iwjsreg`) as separate files within one library, not a reason to
//! add an external crate.

use crate::error::{Error, Result};
use serde_json::Value;

/// Splits a JSON Pointer (`"/a/b/0"`) into its unescaped reference tokens.
/// The root pointer (`""`) yields no tokens.
fn tokens(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        return Err(Error::InvalidArgs(format!("pointer must start with '/': {pointer}")));
    }
    Ok(pointer[1..]
        .split('/')
        .map(|tok| tok.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Resolves `pointer` against `root`, returning a reference to the node.
pub fn resolve<'a>(root: &'a Value, pointer: &str) -> Result<&'a Value> {
    let mut node = root;
    for tok in tokens(pointer)? {
        node = step(node, &tok, pointer)?;
    }
    Ok(node)
}

/// Resolves `pointer` against `root`, returning a mutable reference, creating
/// intermediate objects as needed (mirroring the source's `jbn_at`-then-insert
/// pattern used by `set_*`/`merge`).
pub fn resolve_mut<'a>(root: &'a mut Value, pointer: &str) -> Result<&'a mut Value> {
    let mut node = root;
    for tok in tokens(pointer)? {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        let map = node.as_object_mut().expect("coerced above");
        node = map.entry(tok).or_insert(Value::Null);
    }
    Ok(node)
}

fn step<'a>(node: &'a Value, tok: &str, pointer: &str) -> Result<&'a Value> {
    match node {
        Value::Object(map) => map
            .get(tok)
            .ok_or_else(|| Error::PathNotFound(pointer.to_string())),
        Value::Array(arr) => {
            let idx: usize = tok
                .parse()
                .map_err(|_| Error::PathNotFound(pointer.to_string()))?;
            arr.get(idx).ok_or_else(|| Error::PathNotFound(pointer.to_string()))
        }
        _ => Err(Error::PathNotFound(pointer.to_string())),
    }
}

/// Removes the node at `pointer`, returning the removed value. Errors with
/// `PathNotFound` if the path (or its parent) does not exist.
pub fn remove(root: &mut Value, pointer: &str) -> Result<Value> {
    let toks = tokens(pointer)?;
    let Some((last, parent_toks)) = toks.split_last() else {
        return Err(Error::InvalidArgs("cannot remove the document root".into()));
    };
    let mut node = root;
    for tok in parent_toks {
        node = step_mut(node, tok, pointer)?;
    }
    match node {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| Error::PathNotFound(pointer.to_string())),
        Value::Array(arr) => {
            let idx: usize = last
                .parse()
                .map_err(|_| Error::PathNotFound(pointer.to_string()))?;
            if idx < arr.len() {
                Ok(arr.remove(idx))
            } else {
                Err(Error::PathNotFound(pointer.to_string()))
            }
        }
        _ => Err(Error::PathNotFound(pointer.to_string())),
    }
}

fn step_mut<'a>(node: &'a mut Value, tok: &str, pointer: &str) -> Result<&'a mut Value> {
    match node {
        Value::Object(map) => map
            .get_mut(tok)
            .ok_or_else(|| Error::PathNotFound(pointer.to_string())),
        Value::Array(arr) => {
            let idx: usize = tok
                .parse()
                .map_err(|_| Error::PathNotFound(pointer.to_string()))?;
            arr.get_mut(idx).ok_or_else(|| Error::PathNotFound(pointer.to_string()))
        }
        _ => Err(Error::PathNotFound(pointer.to_string())),
    }
}
