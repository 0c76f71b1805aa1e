use async_trait::async_trait;
use shared::entity::{signal_updates, signals};
use shared::models::{
    message_link, text_hash, CallFields, ChannelMessage, SignalStatus, UpdateKind,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{FallbackPrices, Owner, OwnerRow, SignalStore, StoreError};

/// In-memory store with the same conflict semantics as the database
/// backend. Used for dry runs and tests; rows live in plain vectors, which
/// is fine at the scale of one ingestion run.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    signals: Vec<signals::Model>,
    updates: Vec<signal_updates::Model>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn signal_count(&self) -> usize {
        self.inner.lock().await.signals.len()
    }

    pub async fn update_count(&self) -> usize {
        self.inner.lock().await.updates.len()
    }

    pub async fn updates(&self) -> Vec<signal_updates::Model> {
        self.inner.lock().await.updates.clone()
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn upsert_signal(
        &self,
        msg: &ChannelMessage,
        fields: &CallFields,
    ) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner
            .signals
            .iter_mut()
            .find(|s| s.call_message_id == msg.id)
        {
            row.channel_id = msg.channel_id;
            row.message_link = message_link(msg.channel_id, msg.id);
            row.pair = fields.pair.clone();
            row.entry = fields.entry;
            row.target1 = fields.target1;
            row.target2 = fields.target2;
            row.target3 = fields.target3;
            row.target4 = fields.target4;
            row.stop1 = fields.stop1;
            row.stop2 = fields.stop2;
            row.risk_level = fields.risk_level.clone();
            row.volume_rank_num = fields.volume_rank_num;
            row.volume_rank_den = fields.volume_rank_den;
            row.created_at = msg.date;
            row.raw_text = msg.text.clone();
            row.text_hash = text_hash(&msg.text);
            row.edit_date = None;
            return Ok(row.signal_id.clone());
        }

        let signal_id = Uuid::new_v4().to_string();
        inner.signals.push(signals::Model {
            signal_id: signal_id.clone(),
            channel_id: msg.channel_id,
            call_message_id: msg.id,
            message_link: message_link(msg.channel_id, msg.id),
            pair: fields.pair.clone(),
            entry: fields.entry,
            target1: fields.target1,
            target2: fields.target2,
            target3: fields.target3,
            target4: fields.target4,
            stop1: fields.stop1,
            stop2: fields.stop2,
            risk_level: fields.risk_level.clone(),
            volume_rank_num: fields.volume_rank_num,
            volume_rank_den: fields.volume_rank_den,
            created_at: msg.date,
            status: SignalStatus::Open.as_str().to_string(),
            raw_text: msg.text.clone(),
            text_hash: text_hash(&msg.text),
            edit_date: None,
        });
        Ok(signal_id)
    }

    async fn insert_update(
        &self,
        signal_id: &str,
        msg: &ChannelMessage,
        kind: UpdateKind,
        price: Option<f64>,
        linked_msg_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let exists = inner.updates.iter().any(|u| {
            u.channel_id == msg.channel_id
                && u.update_message_id == msg.id
                && u.update_type == kind.as_str()
        });
        if exists {
            return Ok(false);
        }
        inner.updates.push(signal_updates::Model {
            channel_id: msg.channel_id,
            update_message_id: msg.id,
            update_type: kind.as_str().to_string(),
            signal_id: signal_id.to_string(),
            message_link: message_link(msg.channel_id, msg.id),
            price,
            update_at: msg.date,
            raw_text: msg.text.clone(),
            reply_to_msg_id: msg.reply_to_msg_id,
            linked_msg_id,
        });
        Ok(true)
    }

    async fn apply_status(
        &self,
        signal_id: &str,
        current: SignalStatus,
        event: UpdateKind,
    ) -> Result<SignalStatus, StoreError> {
        let next = current.next(event);
        if next != current {
            let mut inner = self.inner.lock().await;
            if let Some(row) = inner.signals.iter_mut().find(|s| s.signal_id == signal_id) {
                row.status = next.as_str().to_string();
            }
        }
        Ok(next)
    }

    async fn find_by_call_message(
        &self,
        channel_id: i64,
        call_message_id: i64,
    ) -> Result<Option<Owner>, StoreError> {
        let inner = self.inner.lock().await;
        let row = inner
            .signals
            .iter()
            .find(|s| s.channel_id == channel_id && s.call_message_id == call_message_id);
        match row {
            Some(row) => Ok(Some(Owner {
                signal_id: row.signal_id.clone(),
                status: row.status.parse()?,
            })),
            None => Ok(None),
        }
    }

    async fn find_owning_signal(
        &self,
        channel_id: i64,
        pair: &str,
        before_id: i64,
    ) -> Result<Option<OwnerRow>, StoreError> {
        let inner = self.inner.lock().await;
        let row = inner
            .signals
            .iter()
            .filter(|s| {
                s.channel_id == channel_id
                    && s.pair == pair
                    && s.call_message_id < before_id
                    && matches!(s.status.as_str(), "open" | "tp1" | "tp2" | "tp3")
            })
            .max_by_key(|s| s.call_message_id);
        match row {
            Some(row) => Ok(Some(OwnerRow {
                signal_id: row.signal_id.clone(),
                call_message_id: row.call_message_id,
                status: row.status.parse()?,
            })),
            None => Ok(None),
        }
    }

    async fn fallback_prices(&self, signal_id: &str) -> Result<Option<FallbackPrices>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .signals
            .iter()
            .find(|s| s.signal_id == signal_id)
            .map(|r| FallbackPrices {
                targets: [r.target1, r.target2, r.target3, r.target4],
                stop1: r.stop1,
            }))
    }

    async fn apply_edit(
        &self,
        msg: &ChannelMessage,
        fields: &CallFields,
        strict: bool,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner
            .signals
            .iter_mut()
            .find(|s| s.channel_id == msg.channel_id && s.call_message_id == msg.id)
        else {
            return Ok(false);
        };
        if strict {
            if let (Some(stored), Some(incoming)) = (row.edit_date, msg.edit_date) {
                if stored >= incoming {
                    return Ok(false);
                }
            }
        }
        row.entry = fields.entry;
        row.target1 = fields.target1;
        row.target2 = fields.target2;
        row.target3 = fields.target3;
        row.target4 = fields.target4;
        row.stop1 = fields.stop1;
        row.stop2 = fields.stop2;
        row.risk_level = fields.risk_level.clone();
        row.volume_rank_num = fields.volume_rank_num;
        row.volume_rank_den = fields.volume_rank_den;
        row.raw_text = msg.text.clone();
        row.text_hash = text_hash(&msg.text);
        row.edit_date = msg.edit_date;
        Ok(true)
    }

    async fn recent_signals(
        &self,
        limit: u64,
    ) -> Result<Vec<signals::Model>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows = inner.signals.clone();
        rows.sort_by_key(|s| std::cmp::Reverse(s.call_message_id));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn call_fields(pair: &str, entry: f64) -> CallFields {
        CallFields {
            pair: pair.to_string(),
            entry,
            target1: Some(entry * 1.05),
            target2: None,
            target3: None,
            target4: None,
            stop1: Some(entry * 0.9),
            stop2: None,
            risk_level: None,
            volume_rank_num: None,
            volume_rank_den: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_same_call_is_one_row_with_latest_fields() {
        let store = MemoryStore::new();
        let msg = ChannelMessage::new(100, -100500, "call v1", Utc::now());

        let sid_first = store.upsert_signal(&msg, &call_fields("XYZUSDT", 1.0)).await.unwrap();
        let sid_second = store.upsert_signal(&msg, &call_fields("XYZUSDT", 2.0)).await.unwrap();

        assert_eq!(sid_first, sid_second);
        assert_eq!(store.signal_count().await, 1);
        let rows = store.recent_signals(10).await.unwrap();
        assert_eq!(rows[0].entry, 2.0);
    }

    #[tokio::test]
    async fn test_upsert_preserves_status() {
        let store = MemoryStore::new();
        let msg = ChannelMessage::new(100, -100500, "call", Utc::now());
        let sid = store.upsert_signal(&msg, &call_fields("XYZUSDT", 1.0)).await.unwrap();
        store.apply_status(&sid, SignalStatus::Open, UpdateKind::Tp2).await.unwrap();

        store.upsert_signal(&msg, &call_fields("XYZUSDT", 1.5)).await.unwrap();
        let owner = store.find_by_call_message(-100500, 100).await.unwrap().unwrap();
        assert_eq!(owner.status, SignalStatus::Tp2);
    }

    #[tokio::test]
    async fn test_insert_update_is_replay_safe() {
        let store = MemoryStore::new();
        let msg = ChannelMessage::new(101, -100500, "Target 1: 1.05 ✅", Utc::now());

        let first = store
            .insert_update("sid", &msg, UpdateKind::Tp1, Some(1.05), None)
            .await
            .unwrap();
        let replay = store
            .insert_update("sid", &msg, UpdateKind::Tp1, Some(1.05), None)
            .await
            .unwrap();

        assert!(first);
        assert!(!replay);
        assert_eq!(store.update_count().await, 1);
    }

    #[tokio::test]
    async fn test_same_message_distinct_event_types_both_stored() {
        let store = MemoryStore::new();
        let msg = ChannelMessage::new(101, -100500, "all targets hit", Utc::now());

        assert!(store.insert_update("sid", &msg, UpdateKind::Tp3, None, None).await.unwrap());
        assert!(store.insert_update("sid", &msg, UpdateKind::Tp4, None, None).await.unwrap());
        assert_eq!(store.update_count().await, 2);
    }

    #[tokio::test]
    async fn test_find_owning_signal_prefers_newest_open_below_cutoff() {
        let store = MemoryStore::new();
        let older = ChannelMessage::new(100, -100500, "call a", Utc::now());
        let newer = ChannelMessage::new(200, -100500, "call b", Utc::now());
        let later = ChannelMessage::new(900, -100500, "call c", Utc::now());
        store.upsert_signal(&older, &call_fields("XYZUSDT", 1.0)).await.unwrap();
        let sid_newer = store.upsert_signal(&newer, &call_fields("XYZUSDT", 1.1)).await.unwrap();
        store.upsert_signal(&later, &call_fields("XYZUSDT", 1.2)).await.unwrap();

        let row = store.find_owning_signal(-100500, "XYZUSDT", 500).await.unwrap().unwrap();
        assert_eq!(row.signal_id, sid_newer);
        assert_eq!(row.call_message_id, 200);
    }

    #[tokio::test]
    async fn test_find_owning_signal_skips_closed() {
        let store = MemoryStore::new();
        let msg = ChannelMessage::new(100, -100500, "call", Utc::now());
        let sid = store.upsert_signal(&msg, &call_fields("XYZUSDT", 1.0)).await.unwrap();
        store.apply_status(&sid, SignalStatus::Open, UpdateKind::Sl).await.unwrap();

        assert!(store.find_owning_signal(-100500, "XYZUSDT", 500).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_edit_strict_rejects_stale() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut msg = ChannelMessage::new(100, -100500, "call", now);
        store.upsert_signal(&msg, &call_fields("XYZUSDT", 1.0)).await.unwrap();

        msg.edit_date = Some(now + chrono::Duration::minutes(5));
        assert!(store.apply_edit(&msg, &call_fields("XYZUSDT", 1.5), true).await.unwrap());

        // An older edit arriving late must not regress the fields.
        msg.edit_date = Some(now + chrono::Duration::minutes(1));
        assert!(!store.apply_edit(&msg, &call_fields("XYZUSDT", 0.5), true).await.unwrap());
        let rows = store.recent_signals(1).await.unwrap();
        assert_eq!(rows[0].entry, 1.5);
    }
}
