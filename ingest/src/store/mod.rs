//! Persistence layer
//!
//! All writes are idempotent: signals upsert on their call message id,
//! updates insert-or-ignore on their composite key, and status writes only
//! happen when the state machine actually advances. `DbStore` talks to
//! Postgres or SQLite through SeaORM; `MemoryStore` backs dry runs and
//! tests.

mod db;
mod memory;

pub use db::DbStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use shared::models::{CallFields, ChannelMessage, SignalStatus, UpdateKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("stored status is corrupt: {0}")]
    BadStatus(#[from] shared::models::ParseStatusError),
}

/// Resolution result: the signal an update belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub signal_id: String,
    pub status: SignalStatus,
}

/// Fallback-query row; carries the call id so the resolver can refresh the
/// working-set cache.
#[derive(Debug, Clone)]
pub struct OwnerRow {
    pub signal_id: String,
    pub call_message_id: i64,
    pub status: SignalStatus,
}

/// Recorded target/stop prices of a signal, used when an update event
/// carries no price of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPrices {
    pub targets: [Option<f64>; 4],
    pub stop1: Option<f64>,
}

impl FallbackPrices {
    pub fn for_kind(&self, kind: UpdateKind) -> Option<f64> {
        match kind {
            UpdateKind::Tp1 => self.targets[0],
            UpdateKind::Tp2 => self.targets[1],
            UpdateKind::Tp3 => self.targets[2],
            UpdateKind::Tp4 => self.targets[3],
            UpdateKind::Sl => self.stop1,
        }
    }
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert a signal, or overwrite its mutable fields when the call
    /// message id was seen before. The opaque `signal_id` is generated on
    /// first insert and preserved on conflict, as is `status`.
    async fn upsert_signal(
        &self,
        msg: &ChannelMessage,
        fields: &CallFields,
    ) -> Result<String, StoreError>;

    /// Insert one TP/SL event. Returns `false` when the composite key
    /// already exists (stream replay); that is expected, not an error.
    async fn insert_update(
        &self,
        signal_id: &str,
        msg: &ChannelMessage,
        kind: UpdateKind,
        price: Option<f64>,
        linked_msg_id: Option<i64>,
    ) -> Result<bool, StoreError>;

    /// Run the status state machine and persist the result only when it
    /// differs from `current`.
    async fn apply_status(
        &self,
        signal_id: &str,
        current: SignalStatus,
        event: UpdateKind,
    ) -> Result<SignalStatus, StoreError>;

    /// Signal identified by its call message on a channel (reply-link and
    /// embedded-link resolution).
    async fn find_by_call_message(
        &self,
        channel_id: i64,
        call_message_id: i64,
    ) -> Result<Option<Owner>, StoreError>;

    /// Most recent still-open signal for a pair whose call precedes
    /// `before_id`. When several signals for one pair are open at once the
    /// highest call id wins; there is no further tie-break.
    async fn find_owning_signal(
        &self,
        channel_id: i64,
        pair: &str,
        before_id: i64,
    ) -> Result<Option<OwnerRow>, StoreError>;

    async fn fallback_prices(&self, signal_id: &str) -> Result<Option<FallbackPrices>, StoreError>;

    /// Overwrite the mutable fields of an existing signal after a message
    /// edit; `signal_id` and `status` are left untouched. With `strict`
    /// set, an edit whose timestamp is not newer than the stored one is
    /// refused. Returns `false` when nothing was written.
    async fn apply_edit(
        &self,
        msg: &ChannelMessage,
        fields: &CallFields,
        strict: bool,
    ) -> Result<bool, StoreError>;

    /// Most recent signals, newest first (post-run summary).
    async fn recent_signals(
        &self,
        limit: u64,
    ) -> Result<Vec<shared::entity::signals::Model>, StoreError>;
}
