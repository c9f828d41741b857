//! # Listmonk Sync
//!
//! Incremental, checkpointed import of newly created users from a source
//! database into a Listmonk subscriber list.
//!
//! ## Core Components
//!
//! * `checkpoint` - last-synced timestamp and its persistence contract
//! * `source` - read-only query interface of the source system
//! * `extract` - selection of records created after the checkpoint
//! * `transform` - mapping of records onto import rows, CSV serialization
//! * `artifacts` - raw and processed CSV files written during a run
//! * `listmonk` - login exchange and subscriber import
//! * `notify` - best-effort run notifications
//! * `run_log` - run-scoped log file and retention
//! * `sync` - the orchestrator and its state machine
//! * `config` - validated configuration passed to every stage
//! * `error` - error types
//!
//! ## Architecture
//!
//! Each invocation is one run: read the checkpoint, extract newer records,
//! transform them, log in, upload, and only on a confirmed import move the
//! checkpoint forward to the newest uploaded record. A failed run leaves the
//! checkpoint alone, so the next scheduled run retries the same records.
//! Runs are triggered externally and must not overlap.

pub mod artifacts;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod listmonk;
pub mod notify;
pub mod run_log;
pub mod source;
pub mod sync;
pub mod testing;
pub mod transform;

// Re-export main types for convenience
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use listmonk::{ListmonkClient, SubscriberTarget};
pub use notify::{notifier_from_config, Notifier};
pub use source::{RecordSource, SledSource, SourceScan};
pub use sync::{RunMode, RunOutcome, RunReport, SyncPipeline, SyncState};
