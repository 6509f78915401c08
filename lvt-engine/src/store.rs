//! Canonical per-session state: the merged tree and the range cache.

use std::collections::hash_map::Entry;
use std::collections::BTreeMap;

use lvt_core::{detect_key_slot_with, item_key, ItemRecord, Node, RangeNode, Statics, StaticsKey};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Map, Value};

/// Last full state of one range, keyed by field path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeCacheEntry {
    pub items: Vec<ItemRecord>,
    pub statics: Statics,
    /// Fixed when the entry is first created, never re-derived.
    pub key_slot: usize,
    pub else_branch: Option<Node>,
}

impl RangeCacheEntry {
    /// Position of the first item whose key equals `key`.
    pub fn position_of(items: &[ItemRecord], key_slot: usize, key: &str) -> Option<usize> {
        items
            .iter()
            .position(|item| item_key(item, key_slot).as_deref() == Some(key))
    }

    /// The full range node this entry stands for.
    pub fn to_range_node(&self) -> RangeNode {
        RangeNode {
            items: self.items.clone(),
            statics: Some(self.statics.clone()),
            else_branch: self.else_branch.clone().map(Box::new),
        }
    }
}

/// Range cache: field path → last full range state.
#[derive(Debug, Default)]
pub struct RangeCache {
    entries: FxHashMap<String, RangeCacheEntry>,
}

impl RangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a full range for `path`, overwriting items and statics.
    ///
    /// A new entry derives its key slot from `statics`; an existing entry
    /// keeps the slot it was created with.
    pub fn record(
        &mut self,
        path: &str,
        items: Vec<ItemRecord>,
        statics: Statics,
        else_branch: Option<Node>,
        key_attributes: &[String],
    ) -> &RangeCacheEntry {
        match self.entries.entry(path.to_string()) {
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                if entry.statics != statics {
                    let detected = detect_key_slot_with(&statics, key_attributes);
                    if detected != entry.key_slot {
                        log::debug!(
                            "Range '{path}' statics now suggest key slot {detected}; keeping {}",
                            entry.key_slot
                        );
                    }
                }
                entry.items = items;
                entry.statics = statics;
                entry.else_branch = else_branch;
                entry
            }
            Entry::Vacant(vacant) => {
                let key_slot = detect_key_slot_with(&statics, key_attributes);
                log::trace!("Range '{path}' keyed by slot {key_slot}");
                vacant.insert(RangeCacheEntry {
                    items,
                    statics,
                    key_slot,
                    else_branch,
                })
            }
        }
    }

    #[inline]
    pub fn get(&self, path: &str) -> Option<&RangeCacheEntry> {
        self.entries.get(path)
    }

    #[inline]
    pub fn get_mut(&mut self, path: &str) -> Option<&mut RangeCacheEntry> {
        self.entries.get_mut(path)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop entries nested under `path` whose first segment below it is not
    /// in `live`. Returns how many were dropped.
    ///
    /// Segments may themselves contain dots, so every dotted prefix of the
    /// remainder is tried.
    pub fn retain_items(&mut self, path: &str, live: &FxHashSet<String>) -> usize {
        if path.is_empty() {
            return 0;
        }
        let prefix = format!("{path}.");
        let before = self.entries.len();
        self.entries.retain(|cached, _| match cached.strip_prefix(&prefix) {
            Some(rest) => live.contains(rest) || rest.match_indices('.').any(|(at, _)| live.contains(&rest[..at])),
            None => true,
        });
        let dropped = before - self.entries.len();
        if dropped > 0 {
            log::trace!("Range '{path}': dropped {dropped} nested cache entr(ies)");
        }
        dropped
    }

    /// Cached paths in sorted order.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

/// The merged top-level tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TreeStore {
    statics: Option<Statics>,
    statics_key: StaticsKey,
    fields: BTreeMap<String, Node>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn statics(&self) -> Option<&Statics> {
        self.statics.as_ref()
    }

    pub fn set_statics(&mut self, statics: Statics, key: StaticsKey) {
        self.statics = Some(statics);
        self.statics_key = key;
    }

    #[inline]
    pub fn get(&self, field: &str) -> Option<&Node> {
        self.fields.get(field)
    }

    #[inline]
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Node> {
        self.fields.get_mut(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, node: Node) -> Option<Node> {
        self.fields.insert(field.into(), node)
    }

    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.statics.is_none() && self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.statics = None;
        self.statics_key = StaticsKey::default();
        self.fields.clear();
    }

    /// Fields in slot order: numeric keys ascending, then the rest by name.
    pub fn ordered_fields(&self) -> Vec<(&str, &Node)> {
        let mut fields: Vec<(&str, &Node)> = self
            .fields
            .iter()
            .map(|(key, node)| (key.as_str(), node))
            .collect();
        fields.sort_by_key(|(key, _)| (key.parse::<usize>().unwrap_or(usize::MAX), *key));
        fields
    }

    /// The store as wire JSON.
    pub fn to_value(&self) -> Value {
        let mut map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(key, node)| (key.clone(), node.to_value()))
            .collect();
        if let Some(statics) = &self.statics {
            map.insert(self.statics_key.as_str().to_string(), json!(statics));
        }
        Value::Object(map)
    }
}
