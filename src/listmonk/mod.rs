//! # Listmonk
//!
//! Target side of the pipeline.
//!
//! * `client` - HTTP client performing the login exchange and the subscriber import
//! * `response` - parsing of the import endpoint's answer into an [`ImportResult`]

pub mod client;
pub mod response;

pub use client::ListmonkClient;
pub use response::{parse_import_response, ImportResult, ImportStatus};

use crate::error::SyncResult;
use crate::transform::STATUS_CONFIRMED;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Session credential obtained by logging in. Lives for one run only and is
/// never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    cookie_name: String,
    cookie_value: String,
}

impl Session {
    pub fn new(cookie_name: impl Into<String>, cookie_value: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            cookie_value: cookie_value.into(),
        }
    }

    /// Value for the `Cookie` request header
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.cookie_name, self.cookie_value)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookie_name", &self.cookie_name)
            .field("cookie_value", &"***")
            .finish()
    }
}

/// `params` field of the import request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportParams {
    pub mode: &'static str,
    pub subscription_status: &'static str,
    pub delim: &'static str,
    pub lists: Vec<u64>,
    /// Existing subscribers are never updated
    pub overwrite: bool,
}

impl ImportParams {
    /// Add-only, pre-confirmed import into one list
    pub fn for_list(list_id: u64) -> Self {
        Self {
            mode: "subscribe",
            subscription_status: STATUS_CONFIRMED,
            delim: ",",
            lists: vec![list_id],
            overwrite: false,
        }
    }
}

/// A serialized batch ready for upload
#[derive(Debug, Clone)]
pub struct ImportUpload {
    pub file: Vec<u8>,
    /// Data rows in `file`, header excluded
    pub rows: usize,
    pub params: ImportParams,
}

/// The subscriber-management system new users are imported into
#[async_trait]
pub trait SubscriberTarget: Send + Sync {
    /// Log in and return a session for the rest of the run.
    async fn authenticate(&self) -> SyncResult<Session>;

    /// Upload one batch. Transport failures are errors; an answer from the
    /// target, good or bad, is an [`ImportResult`].
    async fn import_subscribers(
        &self,
        session: &Session,
        upload: ImportUpload,
    ) -> SyncResult<ImportResult>;
}
