//! # lvt-engine: client-side tree diff engine
//!
//! Merges incremental tree updates into per-session state and reconstructs
//! the complete HTML after every update.
//!
//! ```text
//!  JSON update ──▸ classify (lvt-core) ──▸ merge ──▸ resolve ranges ──▸ render
//!                                          │              │              │
//!                                          ▼              ▼              ▼
//!                                      TreeStore      RangeCache      String
//! ```
//!
//! One [`TreeEngine`] serves one session. Nothing here is shared between
//! engines; run several sessions by creating several engines.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod range;
pub mod render;
pub mod store;

pub use config::EngineConfig;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use engine::{RenderOutput, TreeEngine, UpdateResult};
pub use error::EngineError;
pub use range::{apply_ops, Resolver};
pub use render::Reconstructor;
pub use store::{RangeCache, RangeCacheEntry, TreeStore};
