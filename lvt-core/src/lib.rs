//! # lvt-core: wire model for static/dynamic HTML tree diffs
//!
//! A page is a tree of literal HTML fragments (`statics`) interleaved with
//! positional dynamic slots. Every JSON value received from the server is
//! classified exactly once into a [`Node`] so the engine never has to
//! re-inspect raw JSON shapes.
//!
//! ```text
//!  {"statics": ["<p>", "</p>"], "0": "hi"}       ──▸ Node::Tree
//!  {"d": [{"0": "a"}], "s": ["<li>", "</li>"]}   ──▸ Node::Range
//!  [["r", "a"], ["a", {"0": "c"}]]               ──▸ Node::Ops
//!  [1, 2, 3]                                     ──▸ Node::List
//!  "text" / 42 / true                            ──▸ Node::Scalar
//!  "{{.Field}}"                                  ──▸ Node::Marker
//! ```
//!
//! ## Modules
//!
//! - [`ops`]: differential list operations and their parser
//! - [`key`]: item identity key slot detection

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

pub mod key;
pub mod ops;

pub use key::{detect_key_slot, detect_key_slot_with, item_key, KEY_ATTRIBUTE_PRIORITY};
pub use ops::{is_ops_array, InsertPosition, InvalidOp, OpError, ParsedOp, RangeOp};

/// Literal HTML fragments of a template.
pub type Statics = Vec<String>;

/// One item of a range: slot index → value.
pub type ItemRecord = BTreeMap<String, Node>;

pub const STATICS_KEY: &str = "statics";
pub const SHORT_STATICS_KEY: &str = "s";
pub const RANGE_ITEMS_KEY: &str = "d";
pub const RANGE_ELSE_KEY: &str = "else";

/// Which key a tree node carried its statics under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StaticsKey {
    #[default]
    Long,
    Short,
}

impl StaticsKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StaticsKey::Long => STATICS_KEY,
            StaticsKey::Short => SHORT_STATICS_KEY,
        }
    }
}

/// A template node: literal fragments plus positional slots.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TreeNode {
    pub statics: Statics,
    pub statics_key: StaticsKey,
    pub slots: BTreeMap<String, Node>,
}

impl TreeNode {
    pub fn new(statics: Statics) -> Self {
        Self {
            statics,
            statics_key: StaticsKey::Long,
            slots: BTreeMap::new(),
        }
    }

    /// Number of dynamic slots the statics leave room for.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.statics.len().saturating_sub(1)
    }
}

/// A keyed list sharing one item template.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RangeNode {
    pub items: Vec<ItemRecord>,
    /// `None` when an incremental payload relies on previously cached statics.
    pub statics: Option<Statics>,
    pub else_branch: Option<Box<Node>>,
}

/// Classified wire value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    /// A leaked template control marker such as `{{end}}`.
    Marker(String),
    /// String, number or boolean.
    Scalar(Value),
    Tree(TreeNode),
    Range(RangeNode),
    Ops(Vec<ParsedOp>),
    List(Vec<Node>),
    /// An object with neither statics nor range items: a partial update, or garbage.
    Object(BTreeMap<String, Node>),
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::from_value(value)
    }
}

impl Node {
    /// Classify a wire value. This is the only place JSON shapes are inspected.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::String(text) if is_template_marker(&text) => Node::Marker(text),
            Value::Array(items) => {
                if ops::is_ops_slice(&items) {
                    Node::Ops(ops::parse_ops(items))
                } else {
                    Node::List(items.into_iter().map(Node::from_value).collect())
                }
            }
            Value::Object(map) => Self::from_object(map),
            scalar => Node::Scalar(scalar),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Self {
        match map.remove(RANGE_ITEMS_KEY) {
            Some(Value::Array(raw_items)) => return Node::Range(range_from_parts(raw_items, map)),
            Some(other) => {
                map.insert(RANGE_ITEMS_KEY.to_string(), other);
            }
            None => {}
        }

        for statics_key in [StaticsKey::Long, StaticsKey::Short] {
            let Some(raw) = map.remove(statics_key.as_str()) else {
                continue;
            };
            match parse_statics(&raw) {
                Some(statics) => {
                    return Node::Tree(TreeNode {
                        statics,
                        statics_key,
                        slots: classify_map(map),
                    });
                }
                None => {
                    log::trace!("Ignoring malformed '{}' value: {raw}", statics_key.as_str());
                    map.insert(statics_key.as_str().to_string(), raw);
                }
            }
        }

        Node::Object(classify_map(map))
    }

    /// Convert back to wire JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Node::Null => Value::Null,
            Node::Marker(text) => Value::String(text.clone()),
            Node::Scalar(value) => value.clone(),
            Node::Tree(tree) => {
                let mut map = slots_to_map(&tree.slots);
                map.insert(tree.statics_key.as_str().to_string(), statics_to_value(&tree.statics));
                Value::Object(map)
            }
            Node::Range(range) => {
                let mut map = Map::new();
                map.insert(
                    RANGE_ITEMS_KEY.to_string(),
                    Value::Array(range.items.iter().map(record_to_value).collect()),
                );
                if let Some(statics) = &range.statics {
                    map.insert(SHORT_STATICS_KEY.to_string(), statics_to_value(statics));
                }
                if let Some(else_branch) = &range.else_branch {
                    map.insert(RANGE_ELSE_KEY.to_string(), else_branch.to_value());
                }
                Value::Object(map)
            }
            Node::Ops(ops) => Value::Array(
                ops.iter()
                    .map(|op| match op {
                        Ok(op) => op.to_value(),
                        Err(invalid) => invalid.raw.clone(),
                    })
                    .collect(),
            ),
            Node::List(items) => Value::Array(items.iter().map(Node::to_value).collect()),
            Node::Object(slots) => Value::Object(slots_to_map(slots)),
        }
    }

    /// Text used to match this value against an item identity key.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Node::Scalar(value) => Some(scalar_to_string(value)),
            _ => None,
        }
    }

    /// Whether a differential op array appears anywhere below this node.
    pub fn contains_ops(&self) -> bool {
        match self {
            Node::Ops(_) => true,
            Node::Tree(tree) => tree.slots.values().any(Node::contains_ops),
            Node::Object(slots) => slots.values().any(Node::contains_ops),
            Node::List(items) => items.iter().any(Node::contains_ops),
            Node::Range(range) => {
                range.items.iter().any(|item| item.values().any(Node::contains_ops))
                    || range.else_branch.as_deref().is_some_and(Node::contains_ops)
            }
            Node::Null | Node::Marker(_) | Node::Scalar(_) => false,
        }
    }
}

/// `{{...}}` strings are template control markers that leaked into data.
pub fn is_template_marker(text: &str) -> bool {
    text.len() >= 4 && text.starts_with("{{") && text.ends_with("}}")
}

/// Stringify a scalar the way a browser client would print it.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number_to_string(number),
        other => other.to_string(),
    }
}

fn number_to_string(number: &Number) -> String {
    if number.is_f64() {
        if let Some(float) = number.as_f64() {
            // Whole floats print without a fractional part (`1.0` → `1`).
            if float.is_finite() && float.fract() == 0.0 && float.abs() < 1e15 {
                return format!("{}", float as i64);
            }
        }
    }
    number.to_string()
}

/// Statics must be an array made only of strings.
pub fn parse_statics(raw: &Value) -> Option<Statics> {
    let Value::Array(fragments) = raw else {
        return None;
    };
    fragments
        .iter()
        .map(|fragment| fragment.as_str().map(str::to_string))
        .collect()
}

/// Classify the values of a flat item map.
pub fn record_from_map(map: Map<String, Value>) -> ItemRecord {
    classify_map(map)
}

pub fn record_to_value(record: &ItemRecord) -> Value {
    Value::Object(slots_to_map(record))
}

fn range_from_parts(raw_items: Vec<Value>, mut rest: Map<String, Value>) -> RangeNode {
    let mut items = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        match raw {
            Value::Object(map) => items.push(record_from_map(map)),
            other => log::warn!("Dropping non-object range item: {other}"),
        }
    }

    let statics = rest
        .remove(SHORT_STATICS_KEY)
        .or_else(|| rest.remove(STATICS_KEY))
        .and_then(|raw| parse_statics(&raw));

    RangeNode {
        items,
        statics,
        else_branch: rest.remove(RANGE_ELSE_KEY).map(|raw| Box::new(Node::from_value(raw))),
    }
}

fn classify_map(map: Map<String, Value>) -> BTreeMap<String, Node> {
    map.into_iter()
        .map(|(key, value)| (key, Node::from_value(value)))
        .collect()
}

fn slots_to_map(slots: &BTreeMap<String, Node>) -> Map<String, Value> {
    slots
        .iter()
        .map(|(key, node)| (key.clone(), node.to_value()))
        .collect()
}

fn statics_to_value(statics: &[String]) -> Value {
    Value::Array(statics.iter().cloned().map(Value::String).collect())
}
