//! # Sync orchestration
//!
//! A run moves through these states:
//!
//! ```text
//! Idle -> Extracting -> NoNewRecords ---------------------------------------> Notifying -> Done
//!                    -> HasRecords -> Transforming -> Authenticating -> Uploading
//!                                                                      -> Committing -> Notifying -> Done
//! Extracting | Transforming | Authenticating | Uploading | Committing -> Failed -> Notifying -> Done
//! ```
//!
//! The checkpoint changes only in `Committing`, which is reached only after
//! the target confirmed the import.

pub mod pipeline;
pub mod state;

pub use pipeline::{RunMode, SyncPipeline};
pub use state::{RunOutcome, RunReport, SyncState};
