//! Type coercion for path-based accessors (`at_i64`/`at_f64`/`at_bool`/`at_str`).
//!
//! Grounded on `iwjsreg_at_i64`/`_at_f64`/`_at_bool`/`_at_str`'s `switch`
//! statements in `iwjsreg.c`. Exact-type top-level accessors (`get_str`,
//! `get_i64`, `get_bool`) do not coerce — that is handled directly in
//! `jsr::mod`.

use crate::error::{Error, Result};
use serde_json::Value;

pub fn to_i64(v: &Value) -> Result<i64> {
    match v {
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            Ok(n.as_i64().unwrap_or_else(|| n.as_u64().unwrap() as i64))
        }
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) as i64),
        Value::Bool(b) => Ok(if *b { 1 } else { 0 }),
        Value::Null => Ok(0),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::TypeNotCompatible),
        Value::Object(_) | Value::Array(_) => Err(Error::TypeNotCompatible),
    }
}

pub fn to_f64(v: &Value) -> Result<f64> {
    match v {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::TypeNotCompatible),
        Value::Object(_) | Value::Array(_) => Err(Error::TypeNotCompatible),
    }
}

pub fn to_bool(v: &Value) -> Result<bool> {
    match v {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::String(s) => Ok(s == "true"),
        Value::Object(_) | Value::Array(_) => Err(Error::TypeNotCompatible),
    }
}

pub fn to_str(v: &Value) -> Result<String> {
    match v {
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Object(_) | Value::Array(_) => Err(Error::TypeNotCompatible),
    }
}
