use std::collections::BTreeMap;

use lvt_core::{parse_statics, Node, StaticsKey, SHORT_STATICS_KEY, STATICS_KEY};
use serde_json::Value;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::EngineError;
use crate::range::Resolver;
use crate::render::Reconstructor;
use crate::store::{RangeCache, RangeCacheEntry, TreeStore};

/// Outcome of one [`TreeEngine::apply_update`] call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateResult {
    /// Complete HTML for the whole current tree.
    pub html: String,
    /// Some field's value differs from what was stored before.
    pub changed: bool,
    /// The update carried top-level statics.
    pub had_statics: bool,
    /// Fallbacks taken while merging and rendering.
    pub diagnostics: Vec<Diagnostic>,
}

impl UpdateResult {
    /// Hint that downstream re-rendering can be skipped. Not a guarantee.
    #[inline]
    pub fn can_skip_render(&self) -> bool {
        !self.changed && !self.had_statics
    }
}

/// HTML produced without mutating the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderOutput {
    pub html: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-session tree state and the entry point for inbound updates.
///
/// Owns the merged tree and the range cache. One engine serves exactly one
/// session; callers serialize updates to it.
#[derive(Debug)]
pub struct TreeEngine {
    session_id: Uuid,
    config: EngineConfig,
    store: TreeStore,
    ranges: RangeCache,
    /// Running count of updates applied (lifetime of the engine).
    updates_applied: u64,
}

impl Default for TreeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            config,
            store: TreeStore::new(),
            ranges: RangeCache::new(),
            updates_applied: 0,
        }
    }

    // ---------------------------------------------------------------
    // Ingress
    // ---------------------------------------------------------------

    /// Merge `update` into the store and render the whole tree.
    ///
    /// Never rejects input: shapes that cannot be used are reported in
    /// [`UpdateResult::diagnostics`] and rendered as best they can be.
    pub fn apply_update(&mut self, update: Value) -> UpdateResult {
        let mut diagnostics = Diagnostics::new(self.config.log_diagnostics);

        let fields = match update {
            Value::Object(fields) => fields,
            other => {
                diagnostics.push(Diagnostic::MalformedShape {
                    path: String::new(),
                    detail: format!("update is not an object: {other}"),
                });
                let html = self.render_into(&mut diagnostics);
                return UpdateResult {
                    html,
                    diagnostics: diagnostics.into_vec(),
                    ..UpdateResult::default()
                };
            }
        };

        let mut changed = false;
        let mut had_statics = false;
        let mut touched = Vec::with_capacity(fields.len());

        for (field, raw) in fields {
            if let Some(statics_key) = top_level_statics_key(&field) {
                if let Some(statics) = parse_statics(&raw) {
                    self.store.set_statics(statics, statics_key);
                    had_statics = true;
                    continue;
                }
            }

            let incoming = Node::from_value(raw);
            if incoming.contains_ops() {
                changed = true;
            }

            let field_changed = match self.store.get_mut(&field) {
                Some(existing) => merge_into(existing, incoming),
                None => {
                    self.store.insert(field.clone(), incoming);
                    true
                }
            };
            changed |= field_changed;
            touched.push(field);
        }

        for field in &touched {
            if let Some(node) = self.store.get_mut(field) {
                Resolver::new(&mut self.ranges, &self.config, &mut diagnostics).resolve(node, field, 1);
            }
        }

        let html = self.render_into(&mut diagnostics);
        self.updates_applied += 1;

        log::debug!(
            "Session {}: update #{} touched {} field(s), changed={changed}, {} diagnostic(s)",
            self.session_id,
            self.updates_applied,
            touched.len(),
            diagnostics.len()
        );

        UpdateResult {
            html,
            changed,
            had_statics,
            diagnostics: diagnostics.into_vec(),
        }
    }

    /// Parse a wire payload and apply it.
    ///
    /// Only malformed JSON is an error; shape problems are diagnostics.
    pub fn apply_update_json(&mut self, payload: &str) -> Result<UpdateResult, EngineError> {
        let update: Value = serde_json::from_str(payload)?;
        Ok(self.apply_update(update))
    }

    // ---------------------------------------------------------------
    // Rendering
    // ---------------------------------------------------------------

    /// Render the current store without changing it.
    pub fn render(&self) -> RenderOutput {
        let mut diagnostics = Diagnostics::new(self.config.log_diagnostics);
        let html = self.render_into(&mut diagnostics);
        RenderOutput {
            html,
            diagnostics: diagnostics.into_vec(),
        }
    }

    /// Render an arbitrary node against the current range cache.
    ///
    /// Ranges inside `value` are not cached and op arrays resolve against the
    /// top-level cache entries only.
    pub fn render_value(&self, value: Value) -> RenderOutput {
        let mut diagnostics = Diagnostics::new(self.config.log_diagnostics);
        let node = Node::from_value(value);
        let html = Reconstructor::new(&self.config, &self.ranges, &mut diagnostics).render(&node, "", 1);
        RenderOutput {
            html,
            diagnostics: diagnostics.into_vec(),
        }
    }

    fn render_into(&self, diagnostics: &mut Diagnostics) -> String {
        Reconstructor::new(&self.config, &self.ranges, diagnostics).render_store(&self.store)
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Drop all tree state and every cached range.
    pub fn reset(&mut self) {
        log::info!(
            "Session {}: reset ({} field(s), {} cached range(s))",
            self.session_id,
            self.store.field_count(),
            self.ranges.len()
        );
        self.store.clear();
        self.ranges.clear();
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    #[inline]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    #[inline]
    pub fn ranges(&self) -> &RangeCache {
        &self.ranges
    }

    pub fn range_entry(&self, path: &str) -> Option<&RangeCacheEntry> {
        self.ranges.get(path)
    }

    /// The merged tree as wire JSON.
    pub fn tree_state(&self) -> Value {
        self.store.to_value()
    }

    /// Total updates applied over the lifetime of this engine.
    #[inline]
    pub fn updates_applied(&self) -> u64 {
        self.updates_applied
    }
}

fn top_level_statics_key(field: &str) -> Option<StaticsKey> {
    match field {
        STATICS_KEY => Some(StaticsKey::Long),
        SHORT_STATICS_KEY => Some(StaticsKey::Short),
        _ => None,
    }
}

/// Merge `incoming` into `existing`. Returns whether anything changed.
///
/// A partial object (no statics, no range items) merges slot by slot into a
/// stored template node so its cached statics survive. Anything else
/// replaces the stored value when it differs.
fn merge_into(existing: &mut Node, incoming: Node) -> bool {
    match (existing, incoming) {
        (Node::Tree(tree), Node::Object(partial)) => merge_slots(&mut tree.slots, partial),
        (Node::Object(slots), Node::Object(partial)) => merge_slots(slots, partial),
        // A range resent without statics relies on the cached template, which
        // the stored node already has filled in.
        (Node::Range(stored), Node::Range(incoming)) if incoming.statics.is_none() => {
            let same_else = incoming.else_branch.is_none() || incoming.else_branch == stored.else_branch;
            if stored.items == incoming.items && same_else {
                false
            } else {
                *stored = incoming;
                true
            }
        }
        (existing, incoming) => {
            if *existing == incoming {
                false
            } else {
                *existing = incoming;
                true
            }
        }
    }
}

fn merge_slots(slots: &mut BTreeMap<String, Node>, partial: BTreeMap<String, Node>) -> bool {
    let mut changed = false;
    for (slot, incoming) in partial {
        match slots.get_mut(&slot) {
            Some(existing) => changed |= merge_into(existing, incoming),
            None => {
                slots.insert(slot, incoming);
                changed = true;
            }
        }
    }
    changed
}
