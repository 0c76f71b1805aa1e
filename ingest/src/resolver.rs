//! Correlation of update messages to the call they amend
//!
//! Priority chain: explicit reply link, embedded permalink, the per-run
//! working-set cache, then the storage fallback query. The cache is a
//! shortcut only; the persisted open-signal query is the source of truth
//! it approximates.

use std::collections::HashMap;

use shared::models::{ChannelMessage, SignalStatus};
use tracing::debug;

use crate::store::{Owner, SignalStore, StoreError};

/// Most recently opened-or-advancing signal per pair, scoped to one
/// ingestion run. Constructed by the driver and passed by ownership;
/// never a process-wide singleton.
#[derive(Debug, Default)]
pub struct CorrelationCache {
    entries: HashMap<String, CachedSignal>,
}

#[derive(Debug, Clone)]
pub struct CachedSignal {
    pub signal_id: String,
    /// `None` when the entry was refreshed from an update without the call
    /// id at hand; such entries cannot pass the causality check.
    pub call_message_id: Option<i64>,
    pub status: SignalStatus,
}

impl CorrelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &str) -> Option<&CachedSignal> {
        self.entries.get(pair)
    }

    pub fn insert(&mut self, pair: String, entry: CachedSignal) {
        self.entries.insert(pair, entry);
    }

    /// Record the status a signal advanced to, preserving the known call id.
    pub fn note_status(&mut self, pair: &str, signal_id: &str, status: SignalStatus) {
        let call_message_id = self
            .entries
            .get(pair)
            .filter(|e| e.signal_id == signal_id)
            .and_then(|e| e.call_message_id);
        self.entries.insert(
            pair.to_string(),
            CachedSignal { signal_id: signal_id.to_string(), call_message_id, status },
        );
    }

    pub fn remove(&mut self, pair: &str) {
        self.entries.remove(pair);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the signal an update message belongs to, or `None` when every step
/// of the chain comes up empty (the caller counts that as unresolved).
pub async fn resolve_owner(
    store: &dyn SignalStore,
    cache: &mut CorrelationCache,
    msg: &ChannelMessage,
    pair: &str,
    linked_msg_id: Option<i64>,
) -> Result<Option<Owner>, StoreError> {
    // 1. Explicit reply to the call message.
    if let Some(reply_id) = msg.reply_to_msg_id {
        if let Some(owner) = store.find_by_call_message(msg.channel_id, reply_id).await? {
            debug!(msg_id = msg.id, reply_id, "resolved via reply link");
            return Ok(Some(owner));
        }
    }

    // 2. Permalink embedded in the message body.
    if let Some(linked_id) = linked_msg_id {
        if let Some(owner) = store.find_by_call_message(msg.channel_id, linked_id).await? {
            debug!(msg_id = msg.id, linked_id, "resolved via embedded link");
            return Ok(Some(owner));
        }
    }

    // 3. Working-set cache, only when the cached call precedes this update.
    if let Some(cached) = cache.get(pair) {
        if matches!(cached.call_message_id, Some(call_id) if call_id < msg.id) {
            debug!(msg_id = msg.id, pair, "resolved via working-set cache");
            return Ok(Some(Owner {
                signal_id: cached.signal_id.clone(),
                status: cached.status,
            }));
        }
    }

    // 4. Most recent still-open signal for this pair below the update id.
    if let Some(row) = store.find_owning_signal(msg.channel_id, pair, msg.id).await? {
        debug!(msg_id = msg.id, pair, call_id = row.call_message_id, "resolved via storage fallback");
        cache.insert(
            pair.to_string(),
            CachedSignal {
                signal_id: row.signal_id.clone(),
                call_message_id: Some(row.call_message_id),
                status: row.status,
            },
        );
        return Ok(Some(Owner { signal_id: row.signal_id, status: row.status }));
    }

    Ok(None)
}
