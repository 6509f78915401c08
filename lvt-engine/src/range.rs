//! Range diff engine.
//!
//! Differential ops are applied against the last full state cached for the
//! same field path. The result is written back both to the cache and to the
//! store as a full range node, so a later render never replays the ops.
//!
//! ```text
//!  store["0"] = [["r","a"],["a",{..}]]          cache["0"] = {items, statics}
//!        │                                              │
//!        └────────────── apply_ops ◂────────────────────┘
//!                            │
//!             ┌──────────────┴──────────────┐
//!             ▼                             ▼
//!  store["0"] = {d: items, s: statics}   cache["0"].items = items
//! ```

use lvt_core::{
    detect_key_slot_with, item_key, InsertPosition, ItemRecord, Node, ParsedOp, RangeNode, RangeOp, RANGE_ELSE_KEY,
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::store::{RangeCache, RangeCacheEntry};

/// Child path of `parent`. Top-level fields have an empty parent.
pub(crate) fn join_path(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{parent}.{segment}")
    }
}

/// Path of one range item: its key when it has one, else its index.
pub(crate) fn item_path(range_path: &str, item: &ItemRecord, key_slot: usize, index: usize) -> String {
    let segment = item_key(item, key_slot).unwrap_or_else(|| index.to_string());
    join_path(range_path, &segment)
}

/// Key slot for a range at `path`: the cached one, else derived from `statics`.
pub(crate) fn key_slot_for(ranges: &RangeCache, path: &str, statics: &[String], config: &EngineConfig) -> usize {
    ranges
        .get(path)
        .map(|entry| entry.key_slot)
        .unwrap_or_else(|| detect_key_slot_with(statics, &config.key_attributes))
}

// ---------------------------------------------------------------
// Op application
// ---------------------------------------------------------------

/// Apply `ops` in order to `items`, matching items by `key_slot`.
pub fn apply_ops(
    mut items: Vec<ItemRecord>,
    key_slot: usize,
    ops: &[ParsedOp],
    path: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<ItemRecord> {
    for op in ops {
        match op {
            Ok(op) => apply_op(&mut items, key_slot, op, path, diagnostics),
            Err(invalid) => diagnostics.push(Diagnostic::InvalidOperation {
                path: path.to_string(),
                reason: format!("{} in {}", invalid.error, invalid.raw),
            }),
        }
    }
    items
}

fn apply_op(items: &mut Vec<ItemRecord>, key_slot: usize, op: &RangeOp, path: &str, diagnostics: &mut Diagnostics) {
    let missing = |key: &str| Diagnostic::MissingKeyMatch {
        path: path.to_string(),
        opcode: op.opcode(),
        key: key.to_string(),
    };

    match op {
        RangeOp::Remove { key } => match RangeCacheEntry::position_of(items, key_slot, key) {
            Some(index) => {
                items.remove(index);
            }
            None => diagnostics.push(missing(key)),
        },

        RangeOp::Update { key, changes } => match RangeCacheEntry::position_of(items, key_slot, key) {
            Some(index) => {
                let item = &mut items[index];
                for (slot, value) in changes {
                    item.insert(slot.clone(), value.clone());
                }
            }
            None => diagnostics.push(missing(key)),
        },

        RangeOp::Append { items: appended } => items.extend(appended.iter().cloned()),

        RangeOp::Insert {
            target,
            position,
            items: inserted,
        } => {
            let index = match (target.as_deref(), *position) {
                (None, InsertPosition::Start | InsertPosition::Before) | (Some(_), InsertPosition::Start) => 0,
                (None, InsertPosition::End | InsertPosition::After) | (Some(_), InsertPosition::End) => items.len(),
                (Some(key), relative) => match RangeCacheEntry::position_of(items, key_slot, key) {
                    Some(found) if relative == InsertPosition::After => found + 1,
                    Some(found) => found,
                    None => {
                        diagnostics.push(missing(key));
                        return;
                    }
                },
            };
            items.splice(index..index, inserted.iter().cloned());
        }

        RangeOp::Reorder { keys } => reorder(items, key_slot, keys, path, diagnostics),
    }
}

/// Rebuild `items` by looking up each of `keys` in turn. A key held by
/// several current items resolves to the last of them; items whose key is
/// not listed are dropped.
fn reorder(items: &mut Vec<ItemRecord>, key_slot: usize, keys: &[String], path: &str, diagnostics: &mut Diagnostics) {
    let before = items.len();
    let mut by_key: FxHashMap<String, ItemRecord> = FxHashMap::default();
    for item in items.drain(..) {
        if let Some(key) = item_key(&item, key_slot) {
            by_key.insert(key, item);
        }
    }

    for key in keys {
        match by_key.get(key) {
            Some(item) => items.push(item.clone()),
            None => diagnostics.push(Diagnostic::MissingKeyMatch {
                path: path.to_string(),
                opcode: lvt_core::ops::OP_REORDER,
                key: key.clone(),
            }),
        }
    }

    let listed: FxHashSet<&str> = keys.iter().map(String::as_str).collect();
    let kept = by_key.keys().filter(|key| listed.contains(key.as_str())).count();
    let dropped = before - kept;
    if dropped > 0 {
        diagnostics.push(Diagnostic::ItemsDropped {
            path: path.to_string(),
            count: dropped,
        });
    }
}

/// Path segments of the current items (key, else index) plus `else`.
fn live_segments(items: &[ItemRecord], key_slot: usize) -> FxHashSet<String> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| item_key(item, key_slot).unwrap_or_else(|| index.to_string()))
        .chain(std::iter::once(RANGE_ELSE_KEY.to_string()))
        .collect()
}

/// Keys of items that `ops` bring into the list.
fn introduced_keys(ops: &[ParsedOp], key_slot: usize) -> FxHashSet<String> {
    ops.iter()
        .filter_map(|op| match op {
            Ok(RangeOp::Append { items }) | Ok(RangeOp::Insert { items, .. }) => Some(items),
            _ => None,
        })
        .flatten()
        .filter_map(|item| item_key(item, key_slot))
        .collect()
}

// ---------------------------------------------------------------
// Resolution (store → cache)
// ---------------------------------------------------------------

/// Walks freshly merged nodes: caches every full range under its path and
/// replaces op arrays that have a cached base with the resulting full range.
///
/// Ranges without statics and op arrays without a base are left as they
/// are; the reconstructor reports them when it renders.
pub struct Resolver<'a> {
    ranges: &'a mut RangeCache,
    config: &'a EngineConfig,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Resolver<'a> {
    pub fn new(ranges: &'a mut RangeCache, config: &'a EngineConfig, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            ranges,
            config,
            diagnostics,
        }
    }

    pub fn resolve(&mut self, node: &mut Node, path: &str, depth: usize) {
        if depth > self.config.max_depth {
            log::trace!("Resolution stopped at '{path}' (depth {depth})");
            return;
        }

        match node {
            Node::Tree(tree) => {
                for (slot, child) in tree.slots.iter_mut() {
                    self.resolve(child, &join_path(path, slot), depth + 1);
                }
            }
            Node::Object(slots) => {
                for (slot, child) in slots.iter_mut() {
                    self.resolve(child, &join_path(path, slot), depth + 1);
                }
            }
            Node::List(children) => {
                for (index, child) in children.iter_mut().enumerate() {
                    self.resolve(child, &join_path(path, &index.to_string()), depth + 1);
                }
            }
            Node::Range(range) => self.resolve_range(range, path, depth),
            Node::Ops(ops) => {
                if let Some(range) = self.apply_differential(ops, path, depth) {
                    *node = Node::Range(range);
                }
            }
            Node::Null | Node::Marker(_) | Node::Scalar(_) => {}
        }
    }

    fn resolve_range(&mut self, range: &mut RangeNode, path: &str, depth: usize) {
        if range.statics.is_none() {
            let Some(entry) = self.ranges.get(path) else {
                log::trace!("Range '{path}' has no statics to fall back on");
                return;
            };
            range.statics = Some(entry.statics.clone());
            if range.else_branch.is_none() {
                range.else_branch = entry.else_branch.clone().map(Box::new);
            }
        }
        let statics = range.statics.clone().unwrap_or_default();

        let key_slot = key_slot_for(self.ranges, path, &statics, self.config);
        self.ranges.retain_items(path, &live_segments(&range.items, key_slot));
        self.resolve_items(&mut range.items, key_slot, path, depth);
        if let Some(else_branch) = range.else_branch.as_deref_mut() {
            self.resolve(else_branch, &join_path(path, RANGE_ELSE_KEY), depth + 1);
        }

        self.ranges.record(
            path,
            range.items.clone(),
            statics,
            range.else_branch.as_deref().cloned(),
            &self.config.key_attributes,
        );
    }

    fn resolve_items(&mut self, items: &mut [ItemRecord], key_slot: usize, path: &str, depth: usize) {
        for (index, item) in items.iter_mut().enumerate() {
            let item_path = item_path(path, item, key_slot, index);
            for (slot, value) in item.iter_mut() {
                self.resolve(value, &join_path(&item_path, slot), depth + 1);
            }
        }
    }

    /// Apply `ops` to the cached range at `path`. `None` when there is no base.
    fn apply_differential(&mut self, ops: &[ParsedOp], path: &str, depth: usize) -> Option<RangeNode> {
        let entry = self.ranges.get(path)?;
        let key_slot = entry.key_slot;
        let mut items = apply_ops(entry.items.clone(), key_slot, ops, path, self.diagnostics);

        // Appended or inserted items never inherit nested state from an
        // earlier item with the same key.
        let mut live = live_segments(&items, key_slot);
        for key in introduced_keys(ops, key_slot) {
            live.remove(&key);
        }
        self.ranges.retain_items(path, &live);
        self.resolve_items(&mut items, key_slot, path, depth);

        let entry = self.ranges.get_mut(path)?;
        log::trace!("Range '{path}': {} op(s) → {} item(s)", ops.len(), items.len());
        entry.items = items;
        Some(entry.to_range_node())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(raw: Value) -> ItemRecord {
        lvt_core::record_from_map(raw.as_object().cloned().unwrap())
    }

    fn items(keys: &[&str]) -> Vec<ItemRecord> {
        keys.iter().map(|k| record(json!({"0": k}))).collect()
    }

    fn keys_of(items: &[ItemRecord]) -> Vec<String> {
        items.iter().filter_map(|item| item_key(item, 0)).collect()
    }

    fn ops(raw: Value) -> Vec<ParsedOp> {
        match Node::from_value(raw) {
            Node::Ops(ops) => ops,
            other => panic!("Expected ops, got {other:?}"),
        }
    }

    fn run(base: &[&str], raw_ops: Value) -> (Vec<String>, Vec<Diagnostic>) {
        let mut diagnostics = Diagnostics::new(false);
        let result = apply_ops(items(base), 0, &ops(raw_ops), "0", &mut diagnostics);
        (keys_of(&result), diagnostics.into_vec())
    }

    #[test]
    fn test_remove() {
        let (keys, diagnostics) = run(&["a", "b", "c"], json!([["r", "b"]]));
        assert_eq!(keys, vec!["a", "c"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_remove_missing_key_is_noop() {
        let (keys, diagnostics) = run(&["a"], json!([["r", "zz"]]));
        assert_eq!(keys, vec!["a"]);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::MissingKeyMatch {
                path: "0".into(),
                opcode: "r",
                key: "zz".into()
            }]
        );
    }

    #[test]
    fn test_remove_only_first_duplicate() {
        let (keys, _) = run(&["a", "b", "a"], json!([["r", "a"]]));
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_update_is_shallow_merge() {
        let mut diagnostics = Diagnostics::new(false);
        let base = vec![record(json!({"0": "a", "1": "old", "2": "keep"}))];
        let result = apply_ops(base, 0, &ops(json!([["u", "a", {"1": "new"}]])), "0", &mut diagnostics);

        assert_eq!(result[0]["1"], Node::Scalar(json!("new")));
        assert_eq!(result[0]["2"], Node::Scalar(json!("keep")));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_append_many_in_order() {
        let (keys, _) = run(&["a"], json!([["a", [{"0": "b"}, {"0": "c"}]]]));
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_positions() {
        let (keys, _) = run(&["a", "b"], json!([["i", null, "start", {"0": "s"}]]));
        assert_eq!(keys, vec!["s", "a", "b"]);

        let (keys, _) = run(&["a", "b"], json!([["i", null, "end", {"0": "e"}]]));
        assert_eq!(keys, vec!["a", "b", "e"]);

        let (keys, _) = run(&["a", "b"], json!([["i", "b", "before", {"0": "x"}]]));
        assert_eq!(keys, vec!["a", "x", "b"]);

        let (keys, _) = run(&["a", "b"], json!([["i", "a", "after", [{"0": "x"}, {"0": "y"}]]]));
        assert_eq!(keys, vec!["a", "x", "y", "b"]);
    }

    #[test]
    fn test_insert_missing_target_is_noop() {
        let (keys, diagnostics) = run(&["a"], json!([["i", "zz", "after", {"0": "x"}]]));
        assert_eq!(keys, vec!["a"]);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_reorder() {
        let (keys, diagnostics) = run(&["a", "b", "c"], json!([["o", ["c", "a", "b"]]]));
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_reorder_drops_unlisted_items() {
        let (keys, diagnostics) = run(&["a", "b", "c"], json!([["o", ["c", "a"]]]));
        assert_eq!(keys, vec!["c", "a"]);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::ItemsDropped {
                path: "0".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_reorder_key_listed_twice_yields_item_twice() {
        let (keys, diagnostics) = run(&["a", "b"], json!([["o", ["b", "b", "a"]]]));
        assert_eq!(keys, vec!["b", "b", "a"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_reorder_duplicate_current_key_keeps_last() {
        let mut diagnostics = Diagnostics::new(false);
        let base = vec![
            record(json!({"0": "a", "1": "first"})),
            record(json!({"0": "a", "1": "second"})),
        ];
        let result = apply_ops(base, 0, &ops(json!([["o", ["a"]]])), "0", &mut diagnostics);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["1"], Node::Scalar(json!("second")));
        assert_eq!(
            diagnostics.into_vec(),
            vec![Diagnostic::ItemsDropped {
                path: "0".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_reorder_unknown_key_is_skipped() {
        let (keys, diagnostics) = run(&["a", "b"], json!([["o", ["b", "zz", "a"]]]));
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::MissingKeyMatch {
                path: "0".into(),
                opcode: "o",
                key: "zz".into()
            }]
        );
    }

    #[test]
    fn test_ops_apply_in_order() {
        let (keys, _) = run(&["a", "b"], json!([["r", "a"], ["a", {"0": "c"}], ["o", ["c", "b"]]]));
        assert_eq!(keys, vec!["c", "b"]);
    }

    #[test]
    fn test_invalid_op_is_skipped() {
        let (keys, diagnostics) = run(&["a", "b"], json!([["x", "a"], ["r", "b"]]));
        assert_eq!(keys, vec!["a"]);
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(&diagnostics[0], Diagnostic::InvalidOperation { path, .. } if path == "0"));
    }

    #[test]
    fn test_resolver_records_full_range() {
        let config = EngineConfig::default();
        let mut ranges = RangeCache::new();
        let mut diagnostics = Diagnostics::new(false);
        let mut node = Node::from_value(json!({"d": [{"0": "a"}], "s": ["<li>", "</li>"]}));

        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut node, "0", 1);

        let entry = ranges.get("0").unwrap();
        assert_eq!(entry.items.len(), 1);
        assert_eq!(entry.statics, vec!["<li>", "</li>"]);
    }

    #[test]
    fn test_resolver_replaces_ops_with_full_range() {
        let config = EngineConfig::default();
        let mut ranges = RangeCache::new();
        let mut diagnostics = Diagnostics::new(false);

        let mut base = Node::from_value(json!({"d": [{"0": "a"}, {"0": "b"}], "s": ["<li>", "</li>"]}));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut base, "0", 1);

        let mut update = Node::from_value(json!([["r", "a"]]));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut update, "0", 1);

        assert_eq!(
            update.to_value(),
            json!({"d": [{"0": "b"}], "s": ["<li>", "</li>"]})
        );
        assert_eq!(ranges.get("0").unwrap().items.len(), 1);
    }

    #[test]
    fn test_resolver_leaves_ops_without_base() {
        let config = EngineConfig::default();
        let mut ranges = RangeCache::new();
        let mut diagnostics = Diagnostics::new(false);

        let mut update = Node::from_value(json!([["r", "a"]]));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut update, "0", 1);

        assert!(matches!(update, Node::Ops(_)));
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_resolver_fills_statics_from_cache() {
        let config = EngineConfig::default();
        let mut ranges = RangeCache::new();
        let mut diagnostics = Diagnostics::new(false);

        let mut base = Node::from_value(json!({"d": [], "s": ["<li>", "</li>"], "else": "none"}));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut base, "0", 1);

        let mut update = Node::from_value(json!({"d": [{"0": "x"}]}));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut update, "0", 1);

        match update {
            Node::Range(range) => {
                assert_eq!(range.statics, Some(vec!["<li>".to_string(), "</li>".to_string()]));
                assert_eq!(range.else_branch.as_deref(), Some(&Node::Scalar(json!("none"))));
            }
            other => panic!("Expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_range_paths() {
        let config = EngineConfig::default();
        let mut ranges = RangeCache::new();
        let mut diagnostics = Diagnostics::new(false);

        let mut node = Node::from_value(json!({
            "s": ["<section>", "</section>"],
            "0": {"d": [{"0": "k1", "1": {"d": [{"0": "x"}], "s": ["<i>", "</i>"]}}], "s": ["<div>", "", "</div>"]}
        }));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut node, "2", 1);

        assert_eq!(ranges.paths(), vec!["2.0", "2.0.k1.1"]);
    }

    #[test]
    fn test_removed_item_releases_nested_cache() {
        let config = EngineConfig::default();
        let mut ranges = RangeCache::new();
        let mut diagnostics = Diagnostics::new(false);

        let mut base = Node::from_value(json!({
            "d": [{"0": "k", "1": {"d": [{"0": "x"}], "s": ["<i>", "</i>"]}}],
            "s": ["<div>", "", "</div>"]
        }));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut base, "0", 1);
        assert_eq!(ranges.paths(), vec!["0", "0.k.1"]);

        let mut remove = Node::from_value(json!([["r", "k"]]));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut remove, "0", 1);
        assert_eq!(ranges.paths(), vec!["0"]);
    }

    #[test]
    fn test_full_range_releases_dropped_items() {
        let config = EngineConfig::default();
        let mut ranges = RangeCache::new();
        let mut diagnostics = Diagnostics::new(false);

        let nested = json!({"d": [{"0": "x"}], "s": ["<i>", "</i>"]});
        let mut base = Node::from_value(json!({
            "d": [{"0": "a", "1": nested.clone()}, {"0": "b", "1": nested}],
            "s": ["<div>", "", "</div>"]
        }));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut base, "0", 1);
        assert_eq!(ranges.len(), 3);

        let mut replaced = Node::from_value(json!({"d": [{"0": "b", "1": "plain"}], "s": ["<div>", "", "</div>"]}));
        Resolver::new(&mut ranges, &config, &mut diagnostics).resolve(&mut replaced, "0", 1);
        assert_eq!(ranges.paths(), vec!["0", "0.b.1"]);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "0"), "0");
        assert_eq!(join_path("0", "1"), "0.1");
    }
}
