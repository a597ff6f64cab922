//! Wire messages for the parent pipe.
//!
//! Every message is a single JSON object on its own line. The shape of the
//! object decides what it is:
//!
//! - **Command**: `cmdReq` + `cmdArgs`, one-way, never answered
//! - **Legacy call**: `rpcReq` + `rpcArgs` + `rpcId`, answered with `rpcId` + `rpcRet`
//! - **Call**: `method` + `params` + `id`, answered with `id` + `result` + `error`
//!
//! Correlation ids are opaque. They are kept as raw [`Value`]s so a reply
//! carries exactly the id the parent sent, number or string.

use serde::Serialize;
use serde_json::{Map, Value};

/// Namespace tag for command handler names.
pub const COMMAND_TAG: &str = "cmd_";

/// Namespace tag for RPC handler names.
pub const RPC_TAG: &str = "rpc_";

/// Built-in liveness method every server answers.
pub const HANDSHAKE_METHOD: &str = "handshake";

/// Result returned by the built-in handshake.
pub const HANDSHAKE_REPLY: &str = "handshake";

const CMD_REQ: &str = "cmdReq";
const CMD_ARGS: &str = "cmdArgs";
const RPC_REQ: &str = "rpcReq";
const RPC_ARGS: &str = "rpcArgs";
const RPC_ID: &str = "rpcId";
const METHOD: &str = "method";
const PARAMS: &str = "params";
const ID: &str = "id";

/// The two RPC dialects seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `rpcReq` / `rpcArgs` / `rpcId`, answered with `rpcRet`.
    Legacy,
    /// `method` / `params` / `id`, answered with `result` / `error`.
    Current,
}

/// Where a reply for a message has to go.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyTo {
    /// Dialect the reply must be encoded in.
    pub dialect: Dialect,
    /// Correlation id to echo.
    pub id: Value,
}

/// A decoded line, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// One-way command.
    Command {
        /// Command name, without the namespace tag.
        name: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// RPC call in the legacy dialect.
    LegacyCall {
        /// Method name, without the namespace tag.
        method: String,
        /// Positional arguments.
        args: Vec<Value>,
        /// Correlation id (`null` when the caller sent none).
        id: Value,
    },
    /// RPC call in the current dialect.
    Call {
        /// Method name, without the namespace tag.
        method: String,
        /// Positional arguments.
        params: Vec<Value>,
        /// Correlation id (`null` when the caller sent none).
        id: Value,
    },
    /// A recognised shape with malformed fields, or more than one shape at once.
    Invalid {
        /// What is wrong with the message.
        reason: String,
        /// Reply target, when the message carried enough to build one.
        reply_to: Option<ReplyTo>,
    },
    /// Not an object, or no recognised field.
    Unknown,
}

impl IncomingMessage {
    /// Classifies a decoded JSON document.
    ///
    /// A field holding `null` counts as absent. A message matching more than
    /// one shape is rejected as [`IncomingMessage::Invalid`] rather than
    /// dispatched by precedence.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        let Value::Object(mut obj) = value else {
            return Self::Unknown;
        };

        let is_command = present(&obj, CMD_REQ);
        let is_legacy = present(&obj, RPC_REQ);
        let is_call = present(&obj, METHOD);

        match (is_command, is_legacy, is_call) {
            (false, false, false) => Self::Unknown,
            (true, false, false) => Self::command(&mut obj),
            (false, true, false) => Self::legacy_call(&mut obj),
            (false, false, true) => Self::call(&mut obj),
            _ => {
                let reply_to = if is_call {
                    Some(reply_to(&mut obj, Dialect::Current))
                } else if is_legacy {
                    Some(reply_to(&mut obj, Dialect::Legacy))
                } else {
                    None
                };
                Self::Invalid {
                    reason: "message matches more than one of cmdReq, rpcReq and method"
                        .to_string(),
                    reply_to,
                }
            }
        }
    }

    fn command(obj: &mut Map<String, Value>) -> Self {
        let parsed = take_name(obj, CMD_REQ)
            .and_then(|name| take_args(obj, CMD_ARGS).map(|args| (name, args)));
        match parsed {
            Ok((name, args)) => Self::Command { name, args },
            Err(reason) => Self::Invalid {
                reason,
                reply_to: None,
            },
        }
    }

    fn legacy_call(obj: &mut Map<String, Value>) -> Self {
        let reply_to = reply_to(obj, Dialect::Legacy);
        let parsed = take_name(obj, RPC_REQ)
            .and_then(|name| take_args(obj, RPC_ARGS).map(|args| (name, args)));
        match parsed {
            Ok((method, args)) => Self::LegacyCall {
                method,
                args,
                id: reply_to.id,
            },
            Err(reason) => Self::Invalid {
                reason,
                reply_to: Some(reply_to),
            },
        }
    }

    fn call(obj: &mut Map<String, Value>) -> Self {
        let reply_to = reply_to(obj, Dialect::Current);
        let parsed = take_name(obj, METHOD)
            .and_then(|name| take_args(obj, PARAMS).map(|args| (name, args)));
        match parsed {
            Ok((method, params)) => Self::Call {
                method,
                params,
                id: reply_to.id,
            },
            Err(reason) => Self::Invalid {
                reason,
                reply_to: Some(reply_to),
            },
        }
    }
}

fn present(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_some_and(|v| !v.is_null())
}

fn reply_to(obj: &mut Map<String, Value>, dialect: Dialect) -> ReplyTo {
    let key = match dialect {
        Dialect::Legacy => RPC_ID,
        Dialect::Current => ID,
    };
    ReplyTo {
        dialect,
        id: obj.remove(key).unwrap_or(Value::Null),
    }
}

fn take_name(obj: &mut Map<String, Value>, key: &str) -> Result<String, String> {
    match obj.remove(key) {
        Some(Value::String(name)) => Ok(name),
        Some(other) => Err(format!("`{key}` must be a string, got {other}")),
        None => Err(format!("`{key}` is missing")),
    }
}

fn take_args(obj: &mut Map<String, Value>, key: &str) -> Result<Vec<Value>, String> {
    match obj.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(args)) => Ok(args),
        Some(other) => Err(format!("`{key}` must be an array, got {other}")),
    }
}

/// Reply to a legacy-dialect call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyReply {
    /// Echoed correlation id.
    #[serde(rename = "rpcId")]
    pub rpc_id: Value,
    /// Return value, or a one-element array holding the diagnostic.
    #[serde(rename = "rpcRet")]
    pub rpc_ret: Value,
}

/// Reply to a current-dialect call.
///
/// Both `result` and `error` are always written; the unused one is `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Echoed correlation id.
    pub id: Value,
    /// Return value on success.
    pub result: Option<Value>,
    /// Diagnostic on failure.
    pub error: Option<String>,
}

/// Builds a legacy reply from an outcome.
#[must_use]
pub fn encode_legacy_reply(id: Value, outcome: Result<Value, String>) -> LegacyReply {
    let rpc_ret = match outcome {
        Ok(value) => value,
        Err(diagnostic) => Value::Array(vec![Value::String(diagnostic)]),
    };
    LegacyReply {
        rpc_id: id,
        rpc_ret,
    }
}

/// Builds a current-dialect reply from an outcome.
#[must_use]
pub fn encode_reply(id: Value, outcome: Result<Value, String>) -> Reply {
    match outcome {
        Ok(value) => Reply {
            id,
            result: Some(value),
            error: None,
        },
        Err(diagnostic) => Reply {
            id,
            result: None,
            error: Some(diagnostic),
        },
    }
}

/// A reply in either dialect, ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingReply {
    /// Legacy-dialect reply.
    Legacy(LegacyReply),
    /// Current-dialect reply.
    Current(Reply),
}

impl OutgoingReply {
    /// Encodes `outcome` in the dialect of `to`.
    #[must_use]
    pub fn new(to: ReplyTo, outcome: Result<Value, String>) -> Self {
        match to.dialect {
            Dialect::Legacy => Self::Legacy(encode_legacy_reply(to.id, outcome)),
            Dialect::Current => Self::Current(encode_reply(to.id, outcome)),
        }
    }
}

/// A message the child sends to the parent on its own initiative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outgoing {
    /// One-way command for the parent: `{"cmdReq": .., "cmdArgs": [..]}`.
    Command {
        /// Command name.
        #[serde(rename = "cmdReq")]
        name: String,
        /// Positional arguments.
        #[serde(rename = "cmdArgs")]
        args: Vec<Value>,
    },
    /// Event for the parent's emitter: `{"cmd": "emit", "params": [event, ..]}`.
    Emit {
        /// Always `"emit"`.
        cmd: &'static str,
        /// Event name followed by its arguments.
        params: Vec<Value>,
    },
}

impl Outgoing {
    /// Creates an outgoing command.
    #[must_use]
    pub fn command(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Command {
            name: name.into(),
            args,
        }
    }

    /// Creates an event emission.
    #[must_use]
    pub fn emit(event: impl Into<String>, args: Vec<Value>) -> Self {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(Value::String(event.into()));
        params.extend(args);
        Self::Emit {
            cmd: "emit",
            params,
        }
    }
}
