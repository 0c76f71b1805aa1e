//! Sequential ingestion driver
//!
//! One message at a time, in non-decreasing id order. The working-set cache
//! and every causality check in the resolver depend on that ordering and on
//! this driver being the only writer for the channel, so there is no
//! per-message fan-out. The only suspension points are the pacing delay and
//! the provider flood-wait backoff.

use std::sync::Arc;
use std::time::Duration;

use shared::models::{ChannelMessage, SignalStatus};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{IngestError, SkipReason};
use crate::parser::{MessageKind, Patterns};
use crate::resolver::{resolve_owner, CachedSignal, CorrelationCache};
use crate::source::{MessageSource, SourceError};
use crate::store::SignalStore;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub per_message_delay: Duration,
    pub strict_edits: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            per_message_delay: Duration::from_millis(80),
            strict_edits: false,
        }
    }
}

/// What one processed message amounted to. Recoverable conditions are
/// `Skipped` values here rather than errors, so the stream never unwinds
/// past a single message.
#[derive(Debug, Clone)]
pub enum Outcome {
    CallUpserted { signal_id: String, pair: String },
    CallEdited,
    /// `stored` counts newly persisted rows; on replay it is 0 even though
    /// the message carried events.
    UpdateApplied { pair: String, stored: usize, status: SignalStatus },
    Skipped(SkipReason),
}

/// Counters for one run plus the resumable checkpoint: the highest message
/// id whose effects were durably committed.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub seen: u64,
    pub calls: u64,
    pub edits: u64,
    pub updates: u64,
    pub events: u64,
    pub unresolved: u64,
    pub skipped: u64,
    pub last_processed_id: i64,
}

impl IngestReport {
    fn record(&mut self, outcome: &Outcome) {
        self.seen += 1;
        match outcome {
            Outcome::CallUpserted { .. } => self.calls += 1,
            Outcome::CallEdited => self.edits += 1,
            Outcome::UpdateApplied { stored, .. } => {
                self.updates += 1;
                self.events += *stored as u64;
            }
            Outcome::Skipped(SkipReason::Unresolved { .. }) => self.unresolved += 1,
            Outcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "seen={} calls={} edits={} updates={} events={} unresolved={} skipped={} last_id={}",
            self.seen,
            self.calls,
            self.edits,
            self.updates,
            self.events,
            self.unresolved,
            self.skipped,
            self.last_processed_id
        )
    }
}

pub struct Ingestor {
    store: Arc<dyn SignalStore>,
    patterns: Patterns,
    cache: CorrelationCache,
    opts: IngestOptions,
    report: IngestReport,
}

impl Ingestor {
    pub fn new(store: Arc<dyn SignalStore>, opts: IngestOptions) -> Self {
        Self {
            store,
            patterns: Patterns::new(),
            cache: CorrelationCache::new(),
            opts,
            report: IngestReport::default(),
        }
    }

    pub fn cache_mut(&mut self) -> &mut CorrelationCache {
        &mut self.cache
    }

    /// Counters and checkpoint so far. When [`run`](Self::run) aborts with
    /// an error, `last_processed_id` here is the last durably committed
    /// message; the caller retries from there.
    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    /// Drain the source. Storage failures abort the run; the returned error
    /// leaves the checkpoint at the last durably committed message, so a
    /// retry picks up exactly where this run stopped.
    pub async fn run(
        &mut self,
        source: &mut dyn MessageSource,
    ) -> Result<IngestReport, IngestError> {
        loop {
            let msg = match source.next_message().await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(SourceError::FloodWait { seconds }) => {
                    warn!("Provider flood wait, sleeping {}s", seconds);
                    sleep(Duration::from_secs(seconds + 1)).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let outcome = self.process_message(&msg).await?;
            self.report.record(&outcome);
            self.report.last_processed_id = msg.id;

            match &outcome {
                Outcome::CallUpserted { pair, .. } => {
                    info!("Stored call {} (msg {})", pair, msg.id);
                }
                Outcome::CallEdited => info!("Applied edit to call msg {}", msg.id),
                Outcome::UpdateApplied { pair, stored, status } => {
                    info!("Update {} -> {} ({} stored, msg {})", pair, status, stored, msg.id);
                }
                Outcome::Skipped(SkipReason::Unresolved { pair }) => {
                    warn!("Update without call: pair={} msg {}", pair, msg.id);
                }
                Outcome::Skipped(SkipReason::NotSignalContent) => {
                    debug!("Skipped msg {}", msg.id);
                }
                Outcome::Skipped(reason) => warn!("Skipped msg {}: {}", msg.id, reason),
            }

            if self.report.seen % 200 == 0 {
                info!("Progress: {}", self.report.summary());
            }
            if !self.opts.per_message_delay.is_zero() {
                sleep(self.opts.per_message_delay).await;
            }
        }

        info!("Ingest finished: {}", self.report.summary());
        Ok(self.report.clone())
    }

    pub async fn process_message(
        &mut self,
        msg: &ChannelMessage,
    ) -> Result<Outcome, IngestError> {
        let kind = self.patterns.classify(&msg.text);

        // An edited call for a signal we already hold mutates it in place.
        if msg.edit_date.is_some() && kind == MessageKind::Call {
            let exists = self
                .store
                .find_by_call_message(msg.channel_id, msg.id)
                .await?
                .is_some();
            if exists {
                let Some(fields) = self.patterns.parse_call(&msg.text) else {
                    return Ok(Outcome::Skipped(SkipReason::MalformedCall));
                };
                let applied = self
                    .store
                    .apply_edit(msg, &fields, self.opts.strict_edits)
                    .await?;
                return Ok(if applied {
                    Outcome::CallEdited
                } else {
                    Outcome::Skipped(SkipReason::StaleEdit)
                });
            }
        }

        match kind {
            MessageKind::Call => {
                let Some(fields) = self.patterns.parse_call(&msg.text) else {
                    return Ok(Outcome::Skipped(SkipReason::MalformedCall));
                };
                let signal_id = self.store.upsert_signal(msg, &fields).await?;
                self.cache.insert(
                    fields.pair.clone(),
                    CachedSignal {
                        signal_id: signal_id.clone(),
                        call_message_id: Some(msg.id),
                        status: SignalStatus::Open,
                    },
                );
                Ok(Outcome::CallUpserted { signal_id, pair: fields.pair })
            }
            MessageKind::Update => {
                let parsed = self.patterns.parse_update(&msg.text);
                let Some(pair) = parsed.pair.clone() else {
                    return Ok(Outcome::Skipped(SkipReason::EmptyUpdate));
                };
                if parsed.events.is_empty() {
                    return Ok(Outcome::Skipped(SkipReason::EmptyUpdate));
                }

                let linked_msg_id = self.patterns.linked_msg_id(msg);
                let Some(owner) = resolve_owner(
                    self.store.as_ref(),
                    &mut self.cache,
                    msg,
                    &pair,
                    linked_msg_id,
                )
                .await?
                else {
                    return Ok(Outcome::Skipped(SkipReason::Unresolved { pair }));
                };

                let fallback = self.store.fallback_prices(&owner.signal_id).await?;
                let mut status = owner.status;
                let mut stored = 0usize;
                for event in &parsed.events {
                    let price = event
                        .price
                        .or_else(|| fallback.as_ref().and_then(|f| f.for_kind(event.kind)));
                    if self
                        .store
                        .insert_update(&owner.signal_id, msg, event.kind, price, linked_msg_id)
                        .await?
                    {
                        stored += 1;
                    }
                    status = self
                        .store
                        .apply_status(&owner.signal_id, status, event.kind)
                        .await?;
                    self.cache.note_status(&pair, &owner.signal_id, status);
                    if status.is_terminal() {
                        self.cache.remove(&pair);
                    }
                }
                Ok(Outcome::UpdateApplied { pair, stored, status })
            }
            MessageKind::Other => Ok(Outcome::Skipped(SkipReason::NotSignalContent)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecSource;
    use crate::store::{FallbackPrices, MemoryStore, Owner, OwnerRow, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use shared::models::{CallFields, UpdateKind};

    const CALL_TEXT: &str = "XYZUSDT\nEntry: 1.2345\nTarget 1: 1.30\nTarget 2: 1.35\nTarget 3: 1.40\nTarget 4: 1.45\nStop Loss 1: 1.10\nRisk Level: Medium";

    fn opts() -> IngestOptions {
        IngestOptions { per_message_delay: Duration::ZERO, strict_edits: false }
    }

    #[tokio::test]
    async fn test_malformed_call_does_not_stop_the_stream() {
        let store = Arc::new(MemoryStore::new());
        let mut ingestor = Ingestor::new(store.clone(), opts());
        let now = Utc::now();
        let mut source = VecSource::new(vec![
            ChannelMessage::new(1, -100, "Entry: 9.99 but no pair anywhere", now),
            ChannelMessage::new(2, -100, CALL_TEXT, now),
        ]);

        let report = ingestor.run(&mut source).await.unwrap();
        assert_eq!(report.seen, 2);
        assert_eq!(report.calls, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.last_processed_id, 2);
        assert_eq!(store.signal_count().await, 1);
    }

    #[tokio::test]
    async fn test_edited_call_mutates_in_place() {
        let store = Arc::new(MemoryStore::new());
        let mut ingestor = Ingestor::new(store.clone(), opts());
        let now = Utc::now();

        let call = ChannelMessage::new(10, -100, CALL_TEXT, now);
        ingestor.process_message(&call).await.unwrap();

        let mut edited = ChannelMessage::new(10, -100, CALL_TEXT.replace("1.2345", "1.5000"), now);
        edited.edit_date = Some(now + chrono::Duration::minutes(2));
        let outcome = ingestor.process_message(&edited).await.unwrap();
        assert!(matches!(outcome, Outcome::CallEdited));

        let rows = store.recent_signals(1).await.unwrap();
        assert_eq!(rows[0].entry, 1.5);
        assert_eq!(rows[0].edit_date, edited.edit_date);
        assert_eq!(store.signal_count().await, 1);
    }

    #[tokio::test]
    async fn test_edited_call_without_prior_signal_is_a_fresh_upsert() {
        let store = Arc::new(MemoryStore::new());
        let mut ingestor = Ingestor::new(store.clone(), opts());
        let mut msg = ChannelMessage::new(10, -100, CALL_TEXT, Utc::now());
        msg.edit_date = Some(Utc::now());

        let outcome = ingestor.process_message(&msg).await.unwrap();
        assert!(matches!(outcome, Outcome::CallUpserted { .. }));
    }

    #[tokio::test]
    async fn test_stale_edit_skipped_in_strict_mode() {
        let store = Arc::new(MemoryStore::new());
        let mut ingestor = Ingestor::new(
            store.clone(),
            IngestOptions { per_message_delay: Duration::ZERO, strict_edits: true },
        );
        let now = Utc::now();
        ingestor
            .process_message(&ChannelMessage::new(10, -100, CALL_TEXT, now))
            .await
            .unwrap();

        let mut edit = ChannelMessage::new(10, -100, CALL_TEXT.replace("1.2345", "2.0"), now);
        edit.edit_date = Some(now + chrono::Duration::minutes(5));
        ingestor.process_message(&edit).await.unwrap();

        edit.text = CALL_TEXT.replace("1.2345", "0.1");
        edit.edit_date = Some(now + chrono::Duration::minutes(1));
        let outcome = ingestor.process_message(&edit).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped(SkipReason::StaleEdit)));
        assert_eq!(store.recent_signals(1).await.unwrap()[0].entry, 2.0);
    }

    #[tokio::test]
    async fn test_terminal_status_evicts_pair_from_cache() {
        let store = Arc::new(MemoryStore::new());
        let mut ingestor = Ingestor::new(store.clone(), opts());
        let now = Utc::now();
        ingestor
            .process_message(&ChannelMessage::new(10, -100, CALL_TEXT, now))
            .await
            .unwrap();
        assert_eq!(ingestor.cache_mut().len(), 1);

        let mut sl = ChannelMessage::new(11, -100, "XYZUSDT Stop Loss hit", now);
        sl.reply_to_msg_id = Some(10);
        let outcome = ingestor.process_message(&sl).await.unwrap();
        assert!(
            matches!(outcome, Outcome::UpdateApplied { status: SignalStatus::ClosedLoss, .. })
        );
        assert!(ingestor.cache_mut().is_empty());
    }

    /// Source that reports flood wait once before yielding its messages.
    struct FloodOnce {
        tripped: bool,
        inner: VecSource,
    }

    #[async_trait]
    impl crate::source::MessageSource for FloodOnce {
        async fn next_message(
            &mut self,
        ) -> Result<Option<ChannelMessage>, crate::source::SourceError> {
            if !self.tripped {
                self.tripped = true;
                return Err(crate::source::SourceError::FloodWait { seconds: 0 });
            }
            self.inner.next_message().await
        }
    }

    /// Store that delegates to [`MemoryStore`] until a configured message
    /// id, then fails every write for it.
    struct FailFrom {
        inner: MemoryStore,
        fail_from_id: i64,
    }

    impl FailFrom {
        fn db_down() -> StoreError {
            StoreError::Db(sea_orm::DbErr::Custom("connection lost".into()))
        }
    }

    #[async_trait]
    impl SignalStore for FailFrom {
        async fn upsert_signal(
            &self,
            msg: &ChannelMessage,
            fields: &CallFields,
        ) -> Result<String, StoreError> {
            if msg.id >= self.fail_from_id {
                return Err(Self::db_down());
            }
            self.inner.upsert_signal(msg, fields).await
        }

        async fn insert_update(
            &self,
            signal_id: &str,
            msg: &ChannelMessage,
            kind: UpdateKind,
            price: Option<f64>,
            linked_msg_id: Option<i64>,
        ) -> Result<bool, StoreError> {
            if msg.id >= self.fail_from_id {
                return Err(Self::db_down());
            }
            self.inner.insert_update(signal_id, msg, kind, price, linked_msg_id).await
        }

        async fn apply_status(
            &self,
            signal_id: &str,
            current: SignalStatus,
            event: UpdateKind,
        ) -> Result<SignalStatus, StoreError> {
            self.inner.apply_status(signal_id, current, event).await
        }

        async fn find_by_call_message(
            &self,
            channel_id: i64,
            call_message_id: i64,
        ) -> Result<Option<Owner>, StoreError> {
            self.inner.find_by_call_message(channel_id, call_message_id).await
        }

        async fn find_owning_signal(
            &self,
            channel_id: i64,
            pair: &str,
            before_id: i64,
        ) -> Result<Option<OwnerRow>, StoreError> {
            self.inner.find_owning_signal(channel_id, pair, before_id).await
        }

        async fn fallback_prices(
            &self,
            signal_id: &str,
        ) -> Result<Option<FallbackPrices>, StoreError> {
            self.inner.fallback_prices(signal_id).await
        }

        async fn apply_edit(
            &self,
            msg: &ChannelMessage,
            fields: &CallFields,
            strict: bool,
        ) -> Result<bool, StoreError> {
            if msg.id >= self.fail_from_id {
                return Err(Self::db_down());
            }
            self.inner.apply_edit(msg, fields, strict).await
        }

        async fn recent_signals(
            &self,
            limit: u64,
        ) -> Result<Vec<shared::entity::signals::Model>, StoreError> {
            self.inner.recent_signals(limit).await
        }
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_checkpoint_at_last_committed() {
        let store = Arc::new(FailFrom { inner: MemoryStore::new(), fail_from_id: 2 });
        let mut ingestor = Ingestor::new(store.clone(), opts());
        let now = Utc::now();
        let mut source = VecSource::new(vec![
            ChannelMessage::new(1, -100, CALL_TEXT, now),
            ChannelMessage::new(2, -100, CALL_TEXT.replace("XYZUSDT", "ABCUSDT"), now),
            ChannelMessage::new(3, -100, CALL_TEXT.replace("XYZUSDT", "DEFUSDT"), now),
        ]);

        let err = ingestor.run(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));

        // The checkpoint must not cover the failed message.
        let report = ingestor.report();
        assert_eq!(report.last_processed_id, 1);
        assert_eq!(report.calls, 1);
        assert_eq!(store.inner.signal_count().await, 1);
    }

    #[tokio::test]
    async fn test_flood_wait_resumes_at_same_cursor() {
        let store = Arc::new(MemoryStore::new());
        let mut ingestor = Ingestor::new(store.clone(), opts());
        let mut source = FloodOnce {
            tripped: false,
            inner: VecSource::new(vec![ChannelMessage::new(1, -100, CALL_TEXT, Utc::now())]),
        };

        let report = ingestor.run(&mut source).await.unwrap();
        assert_eq!(report.calls, 1);
        assert_eq!(store.signal_count().await, 1);
    }
}
