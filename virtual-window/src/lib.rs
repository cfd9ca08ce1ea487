//! Virtual window over large paged collections.
//!
//! A consumer addresses items by index while only a bounded set of pages is
//! ever resident. Pages are fetched from a slow [`PageSource`] in the
//! background, newest request first and at most a few at a time.
//!
//! The crate exposes:
//! - [`WindowEngine`]: single-owner engine that realizes pages on access,
//!   evicts the least recently used ones, and reconciles count changes into
//!   [`EngineEvent`] notifications.
//! - [`PageSource`]: the backing source contract, plus [`MemorySource`] as an
//!   in-memory implementation.
//! - [`PagedItemStore`], [`RecencyWindow`], [`FetchScheduler`]: the pieces the
//!   engine is built from, usable on their own.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod metrics;
pub mod recency;
pub mod scheduler;
pub mod slot;
pub mod source;
pub mod store;

/// Page number: `index / page_size`.
pub type PageId = usize;
/// Generation counter; fetch results from an older epoch are discarded.
pub type Epoch = u64;

pub use config::EngineConfig;
pub use engine::{DefaultComparer, FnComparer, RefreshDeferral, ValueComparer, WindowEngine};
pub use error::{BoxError, EngineError, FetchError, Result};
pub use events::{CurrentChanging, EngineEvent, VisibleRange};
pub use memory::MemorySource;
pub use metrics::{EngineMetrics, EngineMetricsSnapshot};
pub use recency::RecencyWindow;
pub use scheduler::{Completion, FetchScheduler, PageRequest};
pub use slot::{ItemSlot, SlotStatus};
pub use source::{
    ChangeKind, PageSource, RefreshMode, SortDescription, SortDirection, SourceEvent,
    SourceNotifier,
};
pub use store::PagedItemStore;
