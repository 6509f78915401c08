//! Differential range operations.
//!
//! Wire format: an array of tagged arrays, applied in order.
//! ```text
//! ["r", key]                                  remove
//! ["u", key, {"1": "new"}]                    update (shallow merge)
//! ["a", item | [items]]                       append
//! ["i", key | null, position, item | [items]] insert
//! ["o", [key, key, ...]]                      reorder
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{record_from_map, record_to_value, scalar_to_string, ItemRecord};

pub const OP_REMOVE: &str = "r";
pub const OP_UPDATE: &str = "u";
pub const OP_APPEND: &str = "a";
pub const OP_INSERT: &str = "i";
pub const OP_REORDER: &str = "o";

/// Where an insert places its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Start,
    End,
    Before,
    After,
}

impl InsertPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            InsertPosition::Start => "start",
            InsertPosition::End => "end",
            InsertPosition::Before => "before",
            InsertPosition::After => "after",
        }
    }
}

/// One keyed list operation.
#[derive(Clone, Debug, PartialEq)]
pub enum RangeOp {
    Remove {
        key: String,
    },
    Update {
        key: String,
        changes: ItemRecord,
    },
    Append {
        items: Vec<ItemRecord>,
    },
    Insert {
        /// `None` inserts at the absolute start or end.
        target: Option<String>,
        position: InsertPosition,
        items: Vec<ItemRecord>,
    },
    Reorder {
        keys: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpError {
    #[error("operation is not an array")]
    NotAnArray,

    #[error("operation has no string opcode")]
    MissingOpcode,

    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),

    #[error("'{opcode}' is missing argument {index}")]
    MissingArgument { opcode: &'static str, index: usize },

    #[error("'{opcode}' argument {index} is malformed: {reason}")]
    InvalidArgument {
        opcode: &'static str,
        index: usize,
        reason: String,
    },

    #[error("unknown insert position '{0}'")]
    UnknownPosition(String),
}

/// An operation that failed to parse, kept with its raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidOp {
    pub raw: Value,
    pub error: OpError,
}

pub type ParsedOp = Result<RangeOp, InvalidOp>;

/// Differential op arrays are recognized by shape alone: a nonempty array
/// whose first element is an array starting with a string opcode.
pub fn is_ops_array(value: &Value) -> bool {
    matches!(value, Value::Array(items) if is_ops_slice(items))
}

pub(crate) fn is_ops_slice(items: &[Value]) -> bool {
    match items.first() {
        Some(Value::Array(first)) => matches!(first.first(), Some(Value::String(_))),
        _ => false,
    }
}

pub(crate) fn parse_ops(raw_ops: Vec<Value>) -> Vec<ParsedOp> {
    raw_ops
        .into_iter()
        .map(|raw| RangeOp::parse(&raw).map_err(|error| InvalidOp { raw, error }))
        .collect()
}

impl RangeOp {
    pub fn parse(raw: &Value) -> Result<Self, OpError> {
        let Value::Array(parts) = raw else {
            return Err(OpError::NotAnArray);
        };
        let Some(Value::String(opcode)) = parts.first() else {
            return Err(OpError::MissingOpcode);
        };
        let args = &parts[1..];

        match opcode.as_str() {
            OP_REMOVE => Ok(RangeOp::Remove {
                key: parse_key(OP_REMOVE, args, 0)?,
            }),
            OP_UPDATE => Ok(RangeOp::Update {
                key: parse_key(OP_UPDATE, args, 0)?,
                changes: parse_record(OP_UPDATE, args, 1)?,
            }),
            OP_APPEND => Ok(RangeOp::Append {
                items: parse_items(OP_APPEND, args, 0)?,
            }),
            OP_INSERT => {
                let target = match required(OP_INSERT, args, 0)? {
                    Value::Null => None,
                    _ => Some(parse_key(OP_INSERT, args, 0)?),
                };
                Ok(RangeOp::Insert {
                    target,
                    position: parse_position(required(OP_INSERT, args, 1)?)?,
                    items: parse_items(OP_INSERT, args, 2)?,
                })
            }
            OP_REORDER => Ok(RangeOp::Reorder {
                keys: parse_keys(OP_REORDER, args, 0)?,
            }),
            other => Err(OpError::UnknownOpcode(other.to_string())),
        }
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            RangeOp::Remove { .. } => OP_REMOVE,
            RangeOp::Update { .. } => OP_UPDATE,
            RangeOp::Append { .. } => OP_APPEND,
            RangeOp::Insert { .. } => OP_INSERT,
            RangeOp::Reorder { .. } => OP_REORDER,
        }
    }

    /// Wire form. Keys always serialize as strings.
    pub fn to_value(&self) -> Value {
        let opcode = Value::String(self.opcode().to_string());
        match self {
            RangeOp::Remove { key } => Value::Array(vec![opcode, Value::String(key.clone())]),
            RangeOp::Update { key, changes } => Value::Array(vec![
                opcode,
                Value::String(key.clone()),
                record_to_value(changes),
            ]),
            RangeOp::Append { items } => Value::Array(vec![opcode, items_to_value(items)]),
            RangeOp::Insert {
                target,
                position,
                items,
            } => Value::Array(vec![
                opcode,
                target.clone().map_or(Value::Null, Value::String),
                Value::String(position.as_str().to_string()),
                items_to_value(items),
            ]),
            RangeOp::Reorder { keys } => Value::Array(vec![
                opcode,
                Value::Array(keys.iter().cloned().map(Value::String).collect()),
            ]),
        }
    }
}

fn required<'a>(opcode: &'static str, args: &'a [Value], index: usize) -> Result<&'a Value, OpError> {
    args.get(index).ok_or(OpError::MissingArgument { opcode, index })
}

fn key_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(scalar_to_string(value)),
        _ => None,
    }
}

fn parse_key(opcode: &'static str, args: &[Value], index: usize) -> Result<String, OpError> {
    let raw = required(opcode, args, index)?;
    key_from_value(raw).ok_or_else(|| OpError::InvalidArgument {
        opcode,
        index,
        reason: format!("expected a scalar key, got {raw}"),
    })
}

fn parse_keys(opcode: &'static str, args: &[Value], index: usize) -> Result<Vec<String>, OpError> {
    let invalid = |reason: String| OpError::InvalidArgument { opcode, index, reason };
    match required(opcode, args, index)? {
        Value::Array(raw_keys) => raw_keys
            .iter()
            .map(|raw| key_from_value(raw).ok_or_else(|| invalid(format!("non-scalar key {raw}"))))
            .collect(),
        other => Err(invalid(format!("expected a key list, got {other}"))),
    }
}

fn parse_record(opcode: &'static str, args: &[Value], index: usize) -> Result<ItemRecord, OpError> {
    match required(opcode, args, index)? {
        Value::Object(map) => Ok(record_from_map(map.clone())),
        other => Err(OpError::InvalidArgument {
            opcode,
            index,
            reason: format!("expected an item object, got {other}"),
        }),
    }
}

/// A single item object or an array of item objects.
fn parse_items(opcode: &'static str, args: &[Value], index: usize) -> Result<Vec<ItemRecord>, OpError> {
    let invalid = |reason: String| OpError::InvalidArgument { opcode, index, reason };
    match required(opcode, args, index)? {
        Value::Object(map) => Ok(vec![record_from_map(map.clone())]),
        Value::Array(raw_items) => raw_items
            .iter()
            .map(|raw| match raw {
                Value::Object(map) => Ok(record_from_map(map.clone())),
                other => Err(invalid(format!("expected an item object, got {other}"))),
            })
            .collect(),
        other => Err(invalid(format!("expected items, got {other}"))),
    }
}

fn parse_position(raw: &Value) -> Result<InsertPosition, OpError> {
    serde_json::from_value(raw.clone()).map_err(|_| OpError::UnknownPosition(scalar_to_string(raw)))
}

fn items_to_value(items: &[ItemRecord]) -> Value {
    Value::Array(items.iter().map(record_to_value).collect())
}
