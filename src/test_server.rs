//! Handlers served by the `parent-pipe` binary.
//!
//! A parent test suite spawns the binary and exercises both dialects against
//! these:
//!
//! | Kind | Name | Behaviour |
//! |------|------|-----------|
//! | rpc | `test1(v)` | returns `v + 1` |
//! | rpc | `test2(a, b, c)` | checks `a == "abc"`, `b == "def"`, `c.ghi == "jkl"`, returns `[[a, b, c], "foo"]` |
//! | rpc | `testerr()` | always fails |
//! | rpc | `get(key)` | value stored by `set`, or `null` |
//! | rpc | `ping_parent(event)` | emits `event` to the parent, returns `true` |
//! | cmd | `set(key, value)` | stores a value |
//! | cmd | `note(..)` | logs its arguments on stderr |

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::pipe::{Context, HandlerError, HandlerResult, Params, Registry};

/// Message raised by `testerr`.
pub const TESTERR_MESSAGE: &str = "testerr always raises this error";

/// State kept between messages.
#[derive(Debug, Default)]
pub struct TestState {
    values: HashMap<String, Value>,
}

impl TestState {
    /// Value stored under `key`, if any.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

/// Builds the test server's handler set.
#[must_use]
pub fn registry() -> Registry<TestState> {
    Registry::builder()
        .method("test1", test1)
        .method("test2", test2)
        .method("testerr", testerr)
        .method("get", get)
        .method("ping_parent", ping_parent)
        .command("set", set)
        .command("note", note)
        .build()
}

fn test1(_ctx: &mut Context<'_, TestState>, params: Params) -> HandlerResult {
    params.expect_len(1)?;
    let v = params.raw(0)?;

    if let Some(i) = v.as_i64() {
        return i
            .checked_add(1)
            .map(Value::from)
            .ok_or_else(|| HandlerError::failed("integer overflow"));
    }
    if let Some(u) = v.as_u64() {
        return u
            .checked_add(1)
            .map(Value::from)
            .ok_or_else(|| HandlerError::failed("integer overflow"));
    }
    if let Some(f) = v.as_f64() {
        return Ok(json!(f + 1.0));
    }

    Err(HandlerError::invalid_params(format!(
        "test1 expects a number, got {v}"
    )))
}

fn test2(_ctx: &mut Context<'_, TestState>, params: Params) -> HandlerResult {
    params.expect_len(3)?;
    let a: String = params.get(0)?;
    let b: String = params.get(1)?;
    let ghi = params.raw(2)?.get("ghi").and_then(Value::as_str);

    if a != "abc" {
        return Err(HandlerError::failed(format!("expected a == \"abc\", got {a:?}")));
    }
    if b != "def" {
        return Err(HandlerError::failed(format!("expected b == \"def\", got {b:?}")));
    }
    if ghi != Some("jkl") {
        return Err(HandlerError::failed("expected c.ghi == \"jkl\""));
    }

    Ok(json!([params.into_vec(), "foo"]))
}

#[allow(clippy::needless_pass_by_value)] // handler signature is fixed
fn testerr(_ctx: &mut Context<'_, TestState>, _params: Params) -> HandlerResult {
    Err(HandlerError::failed(TESTERR_MESSAGE))
}

fn get(ctx: &mut Context<'_, TestState>, params: Params) -> HandlerResult {
    params.expect_len(1)?;
    let key: String = params.get(0)?;
    Ok(ctx.state().value(&key).cloned().unwrap_or(Value::Null))
}

fn ping_parent(ctx: &mut Context<'_, TestState>, params: Params) -> HandlerResult {
    params.expect_len(1)?;
    let event: String = params.get(0)?;
    ctx.emit(event, Vec::new());
    Ok(Value::Bool(true))
}

fn set(ctx: &mut Context<'_, TestState>, params: Params) -> HandlerResult {
    params.expect_len(2)?;
    let key: String = params.get(0)?;
    let value = params.into_vec().swap_remove(1);
    ctx.state_mut().values.insert(key, value);
    Ok(Value::Null)
}

#[allow(clippy::needless_pass_by_value)] // handler signature is fixed
fn note(_ctx: &mut Context<'_, TestState>, params: Params) -> HandlerResult {
    tracing::info!(args = ?params.as_slice(), "Note from parent");
    Ok(Value::Null)
}
