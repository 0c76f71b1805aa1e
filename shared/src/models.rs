use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message from the source channel, as delivered by the collaborator
/// feeding the ingest loop. Messages arrive in non-decreasing `id` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub id: i64,
    pub channel_id: i64,
    pub text: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub edit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reply_to_msg_id: Option<i64>,
    #[serde(default)]
    pub link_entities: Vec<LinkEntity>,
}

/// A URL embedded in a message (inline link or bare URL entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEntity {
    pub url: String,
}

impl ChannelMessage {
    pub fn new(id: i64, channel_id: i64, text: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id,
            channel_id,
            text: text.into(),
            date,
            edit_date: None,
            reply_to_msg_id: None,
            link_entities: Vec::new(),
        }
    }
}

/// Structured fields extracted from a call message. `pair` and `entry` are
/// mandatory; a call missing either is rejected by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallFields {
    pub pair: String,
    pub entry: f64,
    pub target1: Option<f64>,
    pub target2: Option<f64>,
    pub target3: Option<f64>,
    pub target4: Option<f64>,
    pub stop1: Option<f64>,
    pub stop2: Option<f64>,
    pub risk_level: Option<String>,
    pub volume_rank_num: Option<i32>,
    pub volume_rank_den: Option<i32>,
}

/// One take-profit or stop-loss event carried by an update message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Tp1,
    Tp2,
    Tp3,
    Tp4,
    Sl,
}

impl UpdateKind {
    pub const TP_LEVELS: [UpdateKind; 4] =
        [UpdateKind::Tp1, UpdateKind::Tp2, UpdateKind::Tp3, UpdateKind::Tp4];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Tp1 => "tp1",
            UpdateKind::Tp2 => "tp2",
            UpdateKind::Tp3 => "tp3",
            UpdateKind::Tp4 => "tp4",
            UpdateKind::Sl => "sl",
        }
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized signal status: {0}")]
pub struct ParseStatusError(String);

/// Lifecycle status of a signal. `ClosedWin` and `ClosedLoss` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Open,
    Tp1,
    Tp2,
    Tp3,
    ClosedWin,
    ClosedLoss,
}

impl SignalStatus {
    /// Ordering used for the monotonic-advance rule. The two closed states
    /// share the top rank deliberately; tp4 and sl resolve between them by
    /// their own rules, not by rank.
    pub fn rank(self) -> u8 {
        match self {
            SignalStatus::Open => 0,
            SignalStatus::Tp1 => 1,
            SignalStatus::Tp2 => 2,
            SignalStatus::Tp3 => 3,
            SignalStatus::ClosedWin | SignalStatus::ClosedLoss => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SignalStatus::ClosedWin | SignalStatus::ClosedLoss)
    }

    /// Next status after an update event.
    ///
    /// tp1..tp3 only ever advance the status (out-of-order lower events are
    /// no-ops), tp4 closes as a win unconditionally, and sl closes as a loss
    /// unless the signal already closed as a win.
    pub fn next(self, event: UpdateKind) -> SignalStatus {
        match event {
            UpdateKind::Tp1 | UpdateKind::Tp2 | UpdateKind::Tp3 => {
                let advanced = match event {
                    UpdateKind::Tp1 => SignalStatus::Tp1,
                    UpdateKind::Tp2 => SignalStatus::Tp2,
                    _ => SignalStatus::Tp3,
                };
                if advanced.rank() > self.rank() {
                    advanced
                } else {
                    self
                }
            }
            UpdateKind::Tp4 => SignalStatus::ClosedWin,
            UpdateKind::Sl => {
                if self == SignalStatus::ClosedWin {
                    self
                } else {
                    SignalStatus::ClosedLoss
                }
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalStatus::Open => "open",
            SignalStatus::Tp1 => "tp1",
            SignalStatus::Tp2 => "tp2",
            SignalStatus::Tp3 => "tp3",
            SignalStatus::ClosedWin => "closed_win",
            SignalStatus::ClosedLoss => "closed_loss",
        }
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SignalStatus::Open),
            "tp1" => Ok(SignalStatus::Tp1),
            "tp2" => Ok(SignalStatus::Tp2),
            "tp3" => Ok(SignalStatus::Tp3),
            "closed_win" => Ok(SignalStatus::ClosedWin),
            "closed_loss" => Ok(SignalStatus::ClosedLoss),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Permalink for a message. Supergroup-style ids carry a `-100` prefix that
/// is stripped in the `/c/` form.
pub fn message_link(channel_id: i64, msg_id: i64) -> String {
    let chan = channel_id.to_string();
    match chan.strip_prefix("-100") {
        Some(rest) => format!("https://t.me/c/{}/{}", rest, msg_id),
        None => format!("https://t.me/{}/{}", chan, msg_id),
    }
}

/// Hex-encoded SHA-256 of the raw message text, stored for edit detection.
pub fn text_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_monotonic_advance() {
        let mut status = SignalStatus::Open;
        for event in [UpdateKind::Tp1, UpdateKind::Tp3, UpdateKind::Tp2] {
            status = status.next(event);
        }
        assert_eq!(status, SignalStatus::Tp3);
    }

    #[test]
    fn test_closed_win_is_sticky() {
        let mut status = SignalStatus::Open;
        status = status.next(UpdateKind::Tp4);
        assert_eq!(status, SignalStatus::ClosedWin);
        status = status.next(UpdateKind::Sl);
        assert_eq!(status, SignalStatus::ClosedWin);
    }

    #[test]
    fn test_sl_closes_anything_not_won() {
        assert_eq!(SignalStatus::Open.next(UpdateKind::Sl), SignalStatus::ClosedLoss);
        assert_eq!(SignalStatus::Tp3.next(UpdateKind::Sl), SignalStatus::ClosedLoss);
        assert_eq!(SignalStatus::ClosedLoss.next(UpdateKind::Sl), SignalStatus::ClosedLoss);
    }

    #[test]
    fn test_tp4_wins_unconditionally() {
        assert_eq!(SignalStatus::Tp2.next(UpdateKind::Tp4), SignalStatus::ClosedWin);
        assert_eq!(SignalStatus::ClosedLoss.next(UpdateKind::Tp4), SignalStatus::ClosedWin);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SignalStatus::Open,
            SignalStatus::Tp1,
            SignalStatus::Tp2,
            SignalStatus::Tp3,
            SignalStatus::ClosedWin,
            SignalStatus::ClosedLoss,
        ] {
            assert_eq!(status.as_str().parse::<SignalStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SignalStatus>().is_err());
    }

    #[test]
    fn test_message_link_formats() {
        assert_eq!(message_link(-1002051092635, 42), "https://t.me/c/2051092635/42");
        assert_eq!(message_link(12345, 7), "https://t.me/12345/7");
    }
}
