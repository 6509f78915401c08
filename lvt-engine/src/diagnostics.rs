//! Structured fallback events.
//!
//! The engine always renders something. Whenever it has to degrade (a
//! missing slot, an op against an unknown key, a shape it does not
//! understand) it records a [`Diagnostic`] so callers and tests can see the
//! degraded path without the rendered output changing.

use log::Level;

/// One degraded-path event. `path` is the dotted field path it happened at.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Diagnostic {
    #[error("{path}: unrecognized shape rendered as text: {detail}")]
    MalformedShape { path: String, detail: String },

    #[error("{path}: differential ops without a cached range")]
    MissingRangeBase { path: String },

    #[error("{path}: '{opcode}' references unknown key '{key}'")]
    MissingKeyMatch {
        path: String,
        opcode: &'static str,
        key: String,
    },

    #[error("{path}: slot {slot} has no value")]
    MissingDynamicSlot { path: String, slot: usize },

    #[error("{path}: range has no statics and none are cached")]
    MissingStatics { path: String },

    #[error("{path}: template marker '{marker}' swallowed")]
    TemplateMarker { path: String, marker: String },

    #[error("{path}: skipped invalid operation: {reason}")]
    InvalidOperation { path: String, reason: String },

    #[error("{path}: reorder dropped {count} unlisted item(s)")]
    ItemsDropped { path: String, count: usize },

    #[error("{path}: nesting deeper than {limit}")]
    DepthLimit { path: String, limit: usize },
}

/// Discriminant of a [`Diagnostic`], handy for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    MalformedShape,
    MissingRangeBase,
    MissingKeyMatch,
    MissingDynamicSlot,
    MissingStatics,
    TemplateMarker,
    InvalidOperation,
    ItemsDropped,
    DepthLimit,
}

impl Diagnostic {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Diagnostic::MalformedShape { .. } => DiagnosticKind::MalformedShape,
            Diagnostic::MissingRangeBase { .. } => DiagnosticKind::MissingRangeBase,
            Diagnostic::MissingKeyMatch { .. } => DiagnosticKind::MissingKeyMatch,
            Diagnostic::MissingDynamicSlot { .. } => DiagnosticKind::MissingDynamicSlot,
            Diagnostic::MissingStatics { .. } => DiagnosticKind::MissingStatics,
            Diagnostic::TemplateMarker { .. } => DiagnosticKind::TemplateMarker,
            Diagnostic::InvalidOperation { .. } => DiagnosticKind::InvalidOperation,
            Diagnostic::ItemsDropped { .. } => DiagnosticKind::ItemsDropped,
            Diagnostic::DepthLimit { .. } => DiagnosticKind::DepthLimit,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Diagnostic::MalformedShape { path, .. }
            | Diagnostic::MissingRangeBase { path }
            | Diagnostic::MissingKeyMatch { path, .. }
            | Diagnostic::MissingDynamicSlot { path, .. }
            | Diagnostic::MissingStatics { path }
            | Diagnostic::TemplateMarker { path, .. }
            | Diagnostic::InvalidOperation { path, .. }
            | Diagnostic::ItemsDropped { path, .. }
            | Diagnostic::DepthLimit { path, .. } => path,
        }
    }

    /// Benign fallbacks log at debug, visibly wrong output at warn.
    pub fn level(&self) -> Level {
        match self.kind() {
            DiagnosticKind::MissingDynamicSlot
            | DiagnosticKind::MissingKeyMatch
            | DiagnosticKind::TemplateMarker => Level::Debug,
            _ => Level::Warn,
        }
    }
}

/// Collects diagnostics for one engine call.
#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
    log_events: bool,
}

impl Diagnostics {
    pub fn new(log_events: bool) -> Self {
        Self {
            events: Vec::new(),
            log_events,
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.log_events {
            log::log!(diagnostic.level(), "{diagnostic}");
        }
        self.events.push(diagnostic);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.events
    }
}
