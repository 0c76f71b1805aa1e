//! Message sources
//!
//! The transport that talks to the provider lives outside this crate; what
//! arrives here is a stream of [`ChannelMessage`]s in non-decreasing id
//! order. A source that hits provider flow control returns
//! [`SourceError::FloodWait`] and must hand out the same message again on
//! the next call, so the driver can sleep and resume at its cursor.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use shared::models::ChannelMessage;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("provider flood wait: {seconds}s")]
    FloodWait { seconds: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message record: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait MessageSource: Send {
    /// Next message, `None` at end of stream.
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>, SourceError>;
}

/// Pre-collected messages, e.g. a bounded historical window. Sorts by id on
/// construction so callers can hand over messages in any order.
pub struct VecSource {
    queue: VecDeque<ChannelMessage>,
}

impl VecSource {
    pub fn new(mut messages: Vec<ChannelMessage>) -> Self {
        messages.sort_by_key(|m| m.id);
        Self { queue: messages.into() }
    }
}

#[async_trait]
impl MessageSource for VecSource {
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>, SourceError> {
        Ok(self.queue.pop_front())
    }
}

/// Replay of a newline-delimited JSON dump of channel messages, resuming
/// past the ingestion checkpoint.
pub struct JsonlSource {
    queue: VecDeque<ChannelMessage>,
}

impl JsonlSource {
    /// Load `path`, keeping messages with `id > last_id` (and, when set,
    /// only those from `channel_id`).
    pub fn open(
        path: impl AsRef<Path>,
        last_id: i64,
        channel_id: Option<i64>,
    ) -> Result<Self, SourceError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut messages = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let msg: ChannelMessage = serde_json::from_str(line)?;
            if msg.id <= last_id {
                continue;
            }
            if channel_id.is_some_and(|c| c != msg.channel_id) {
                continue;
            }
            messages.push(msg);
        }
        messages.sort_by_key(|m| m.id);
        info!(
            "Loaded {} messages from {} (after id {})",
            messages.len(),
            path.as_ref().display(),
            last_id
        );
        Ok(Self { queue: messages.into() })
    }
}

#[async_trait]
impl MessageSource for JsonlSource {
    async fn next_message(&mut self) -> Result<Option<ChannelMessage>, SourceError> {
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_jsonl_source_filters_and_orders() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let rows = [
            r#"{"id":3,"channel_id":-100,"text":"c","date":"2025-08-01T00:00:03Z"}"#,
            r#"{"id":1,"channel_id":-100,"text":"a","date":"2025-08-01T00:00:01Z"}"#,
            r#"{"id":2,"channel_id":-200,"text":"other channel","date":"2025-08-01T00:00:02Z"}"#,
            r#"{"id":4,"channel_id":-100,"text":"d","date":"2025-08-01T00:00:04Z"}"#,
        ];
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }

        let mut source = JsonlSource::open(file.path(), 1, Some(-100)).unwrap();
        let first = source.next_message().await.unwrap().unwrap();
        let second = source.next_message().await.unwrap().unwrap();
        assert_eq!((first.id, second.id), (3, 4));
        assert!(source.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_jsonl_source_optional_fields_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"id":10,"channel_id":-100,"text":"TP1 hit","date":"2025-08-01T00:00:00Z","reply_to_msg_id":7}}"#
        )
        .unwrap();

        let mut source = JsonlSource::open(file.path(), 0, None).unwrap();
        let msg = source.next_message().await.unwrap().unwrap();
        assert_eq!(msg.reply_to_msg_id, Some(7));
        assert_eq!(msg.edit_date, None);
        assert!(msg.link_entities.is_empty());
    }
}
