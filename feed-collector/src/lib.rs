//! Feed Collector - incremental collection of virtualized feeds
//!
//! Harvests items from an infinitely scrolling, virtualized timeline (the
//! bookmarks feed of Twitter/X), turns each rendered item into a structured
//! record, deduplicates it across scroll cycles and forwards the batch to a
//! remote store.
//!
//! # Architecture
//!
//! The [`controller`] drives a [`page::FeedPage`] through scroll cycles.
//! Every cycle expands truncated items ([`expand`]), renders a fresh
//! snapshot, and hands it to the [`scanner`], which classifies each item and
//! extracts new ones ([`extract`]). The diagnostic mode attaches a
//! [`diagnostics::Reconciler`] to the same loop to find items that were seen
//! but never captured. [`service`] wraps it all in the operations exposed to
//! the CLI and to the native messaging host.

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod expand;
pub mod extract;
pub mod messaging;
pub mod page;
pub mod scanner;
mod selectors;
pub mod service;
pub mod sync;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigError, ConfigSource};
pub use controller::{CollectionRun, CycleObserver, ScrollCollector, ScrollPolicy, ScrollStrategy, StopReason};
pub use diagnostics::{DebugSnapshot, DiagnosticLedger, ReconcileReport, Reconciler};
pub use messaging::{Action, HostRequest, MessagingError};
pub use page::{ChromePage, FeedEntry, FeedPage, NodeHandle, PageError, VirtualFeed};
pub use scanner::{identify, inspect, scan, CaptureDecision, Inspection, SkipReason};
pub use service::{FeedService, Reply, SyncOutcome, EMPTY_RUN_MESSAGE};
pub use sync::{BackendClient, IngestSummary, SyncError};
pub use types::{
    CollectError, CollectedItem, Collection, ContentMetadata, ContentType, ItemIdentity,
};
