//! Reconstructor: turns classified nodes back into HTML.
//!
//! Every template node renders by interleaving: `statics[0]`, slot 0,
//! `statics[1]`, slot 1, ..., `statics[N-1]`. Ranges repeat the same
//! interleave once per item with a shared item template.

use lvt_core::{scalar_to_string, ItemRecord, Node, RangeNode, TreeNode, RANGE_ELSE_KEY};

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::range::{apply_ops, item_path, join_path, key_slot_for};
use crate::store::{RangeCache, TreeStore};

const ROOT_OPEN: &str = "<root>";
const ROOT_CLOSE: &str = "</root>";

/// Read-only renderer over a store and its range cache.
pub struct Reconstructor<'a> {
    config: &'a EngineConfig,
    ranges: &'a RangeCache,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Reconstructor<'a> {
    pub fn new(config: &'a EngineConfig, ranges: &'a RangeCache, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            config,
            ranges,
            diagnostics,
        }
    }

    /// Render the whole store.
    ///
    /// With top-level statics the store is a template node. Without them its
    /// fields render back to back in slot order.
    pub fn render_store(&mut self, store: &TreeStore) -> String {
        match store.statics() {
            Some(statics) => {
                let html = self.interleave(statics, |slot| store.get(slot), "", 0);
                self.strip_root(html)
            }
            None => store
                .ordered_fields()
                .into_iter()
                .map(|(field, node)| self.render_value(node, field, 1))
                .collect(),
        }
    }

    /// Render any node found at `path`.
    pub fn render(&mut self, node: &Node, path: &str, depth: usize) -> String {
        match node {
            Node::Tree(tree) => self.render_tree(tree, path, depth),
            other => self.render_value(other, path, depth),
        }
    }

    fn render_tree(&mut self, tree: &TreeNode, path: &str, depth: usize) -> String {
        let html = self.interleave(&tree.statics, |slot| tree.slots.get(slot), path, depth);
        self.strip_root(html)
    }

    pub fn render_value(&mut self, node: &Node, path: &str, depth: usize) -> String {
        if depth > self.config.max_depth {
            self.diagnostics.push(Diagnostic::DepthLimit {
                path: path.to_string(),
                limit: self.config.max_depth,
            });
            return String::new();
        }

        match node {
            Node::Null => String::new(),
            Node::Marker(marker) => {
                self.diagnostics.push(Diagnostic::TemplateMarker {
                    path: path.to_string(),
                    marker: marker.clone(),
                });
                String::new()
            }
            Node::Scalar(value) => scalar_to_string(value),
            Node::Tree(tree) => self.render_tree(tree, path, depth),
            Node::Range(range) => self.render_range(range, path, depth),
            Node::Ops(ops) => {
                let ranges = self.ranges;
                match ranges.get(path) {
                    Some(entry) => {
                        let items = apply_ops(entry.items.clone(), entry.key_slot, ops, path, self.diagnostics);
                        self.expand_range(&items, &entry.statics, entry.else_branch.as_ref(), path, depth)
                    }
                    None => {
                        self.diagnostics.push(Diagnostic::MissingRangeBase { path: path.to_string() });
                        String::new()
                    }
                }
            }
            Node::List(children) => children
                .iter()
                .enumerate()
                .map(|(index, child)| self.render_value(child, &join_path(path, &index.to_string()), depth + 1))
                .collect(),
            Node::Object(_) => {
                let text = node.to_value().to_string();
                self.diagnostics.push(Diagnostic::MalformedShape {
                    path: path.to_string(),
                    detail: text.clone(),
                });
                text
            }
        }
    }

    fn render_range(&mut self, range: &RangeNode, path: &str, depth: usize) -> String {
        let ranges = self.ranges;
        let cached = ranges.get(path);
        let statics = match (&range.statics, cached) {
            (Some(statics), _) => statics.as_slice(),
            (None, Some(entry)) => entry.statics.as_slice(),
            (None, None) => {
                self.diagnostics.push(Diagnostic::MissingStatics { path: path.to_string() });
                return String::new();
            }
        };
        let else_branch = range
            .else_branch
            .as_deref()
            .or_else(|| cached.and_then(|entry| entry.else_branch.as_ref()));

        self.expand_range(&range.items, statics, else_branch, path, depth)
    }

    /// Interleave every item with the shared statics, or render `else_branch`
    /// when there are no items.
    pub fn expand_range(
        &mut self,
        items: &[ItemRecord],
        statics: &[String],
        else_branch: Option<&Node>,
        path: &str,
        depth: usize,
    ) -> String {
        if items.is_empty() {
            return else_branch
                .map(|node| self.render_value(node, &join_path(path, RANGE_ELSE_KEY), depth + 1))
                .unwrap_or_default();
        }

        let key_slot = key_slot_for(self.ranges, path, statics, self.config);
        let mut html = String::new();
        for (index, item) in items.iter().enumerate() {
            let item_path = item_path(path, item, key_slot, index);
            let rendered = self.interleave(statics, |slot| item.get(slot), &item_path, depth + 1);
            html.push_str(&rendered);
        }
        html
    }

    fn interleave<'n>(
        &mut self,
        statics: &[String],
        slot: impl Fn(&str) -> Option<&'n Node>,
        path: &str,
        depth: usize,
    ) -> String {
        let Some((first, rest)) = statics.split_first() else {
            return String::new();
        };

        let mut html = first.clone();
        for (index, fragment) in rest.iter().enumerate() {
            let key = index.to_string();
            match slot(&key) {
                Some(node) => {
                    let rendered = self.render_value(node, &join_path(path, &key), depth + 1);
                    html.push_str(&rendered);
                }
                None => self.diagnostics.push(Diagnostic::MissingDynamicSlot {
                    path: path.to_string(),
                    slot: index,
                }),
            }
            html.push_str(fragment);
        }
        html
    }

    fn strip_root(&self, html: String) -> String {
        if self.config.strip_root_wrapper && html.contains("root>") {
            html.replace(ROOT_OPEN, "").replace(ROOT_CLOSE, "")
        } else {
            html
        }
    }
}
