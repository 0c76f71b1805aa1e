//! Message classification and field extraction
//!
//! Pure text processing: no I/O. The regex vocabulary matches the source
//! channel's call/update formats; all patterns are compiled once into a
//! [`Patterns`] value owned by the driver.

use regex::Regex;
use shared::models::{CallFields, ChannelMessage, UpdateKind};

const NUM: &str = r"([0-9]*\.?[0-9]+)";
const HIT_MARK: &str = r"(?:✅|✔️|☑️|hit|reached|achieved)";
const SL_LABEL: &str = r"\b(?:stop\s*loss|stoploss|sl)\b";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Call,
    Update,
    Other,
}

/// One TP/SL event extracted from an update message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateEvent {
    pub kind: UpdateKind,
    /// Price from the text; `None` when only the hit marker was present.
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedUpdate {
    pub pair: Option<String>,
    pub events: Vec<UpdateEvent>,
}

impl ParsedUpdate {
    /// An update with no pair or no events cannot be correlated or stored.
    pub fn is_empty(&self) -> bool {
        self.pair.is_none() || self.events.is_empty()
    }
}

/// Per-level pattern pair for take-profit detection: the full form carries a
/// price, the loose form is just "level mentioned, hit marker after it".
struct TpRule {
    kind: UpdateKind,
    full: Regex,
    loose: Regex,
}

pub struct Patterns {
    daily_results: Regex,
    entry: Regex,
    target_hit: Regex,
    sl_label: Regex,
    bare_tp_hit: Regex,
    pair: Regex,
    call_targets: [Regex; 4],
    call_stops: [Regex; 2],
    risk_level: Regex,
    volume_rank: Regex,
    tp_rules: [TpRule; 4],
    sl_price: Regex,
    all_targets: Regex,
    link_tail: Regex,
}

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern must compile")
}

impl Default for Patterns {
    fn default() -> Self {
        Self::new()
    }
}

impl Patterns {
    pub fn new() -> Self {
        let tp_rule = |level: usize| TpRule {
            kind: UpdateKind::TP_LEVELS[level - 1],
            full: rx(&format!(
                r"(?is)\b(?:Target|TP)\s*{level}\s*[:：]?\s*{NUM}.*?{HIT_MARK}"
            )),
            loose: rx(&format!(r"(?is)\b(?:TP|Target|T)\s*{level}\b.*?{HIT_MARK}")),
        };

        Self {
            daily_results: rx(r"(?i)Daily\s+Results"),
            entry: rx(&format!(r"(?i)\bEntry\s*[:：]\s*{NUM}")),
            target_hit: rx(&format!(
                r"(?is)\bTarget\s*\d+\s*[:：]?\s*{NUM}.*?{HIT_MARK}"
            )),
            sl_label: rx(&format!(r"(?i){SL_LABEL}")),
            bare_tp_hit: rx(&format!(r"(?is)\bTP\s*\d+\b.*?{HIT_MARK}")),
            pair: rx(r"(?i)\b([A-Z0-9]{2,}USDT)\b"),
            call_targets: std::array::from_fn(|i| {
                rx(&format!(r"(?i)\bTarget\s*{}\s*[:：]?\s*{}", i + 1, NUM))
            }),
            call_stops: std::array::from_fn(|i| {
                rx(&format!(r"(?i){}\s*{}\s*[:：]?\s*{}", SL_LABEL, i + 1, NUM))
            }),
            risk_level: rx(r"(?i)\bRisk\s*Level\s*[:：]?\s*([A-Za-z]+)"),
            volume_rank: rx(r"(?i)Volume\(24H\)\s*Ranked\s*[:：]?\s*(\d+)\D+(\d+)"),
            tp_rules: [tp_rule(1), tp_rule(2), tp_rule(3), tp_rule(4)],
            sl_price: rx(&format!(r"(?i){SL_LABEL}(?:\s*\d+)?\s*[:：]?\s*{NUM}")),
            all_targets: rx(
                r"(?i)(?:all\s+targets\s+(?:hit|reached|achieved)|tp\s*4\s*(?:hit|reached|done))",
            ),
            link_tail: rx(r"/(?:c/\d+|[A-Za-z0-9_]+)/(\d+)$"),
        }
    }

    /// Decide what a message is. First match wins: the daily results digest
    /// is a hard exclude even though it quotes call and update lines.
    pub fn classify(&self, text: &str) -> MessageKind {
        let t = text.trim();
        if self.daily_results.is_match(t) {
            return MessageKind::Other;
        }
        if self.entry.is_match(t) {
            return MessageKind::Call;
        }
        if self.target_hit.is_match(t) || self.sl_label.is_match(t) || self.bare_tp_hit.is_match(t)
        {
            return MessageKind::Update;
        }
        MessageKind::Other
    }

    /// Extract call fields; `None` when pair or entry is missing (such a
    /// message is never persisted as a signal).
    pub fn parse_call(&self, text: &str) -> Option<CallFields> {
        let pair = self.pair_symbol(text)?;
        let entry = capture_f64(&self.entry, text)?;
        let targets: [Option<f64>; 4] =
            std::array::from_fn(|i| capture_f64(&self.call_targets[i], text));
        let stops: [Option<f64>; 2] =
            std::array::from_fn(|i| capture_f64(&self.call_stops[i], text));
        let risk_level = self
            .risk_level
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| title_case(m.as_str()));
        let (volume_rank_num, volume_rank_den) = match self.volume_rank.captures(text) {
            Some(c) => (
                c.get(1).and_then(|m| m.as_str().parse().ok()),
                c.get(2).and_then(|m| m.as_str().parse().ok()),
            ),
            None => (None, None),
        };

        Some(CallFields {
            pair,
            entry,
            target1: targets[0],
            target2: targets[1],
            target3: targets[2],
            target4: targets[3],
            stop1: stops[0],
            stop2: stops[1],
            risk_level,
            volume_rank_num,
            volume_rank_den,
        })
    }

    /// Extract TP/SL events from an update message. At most one event per
    /// level (the priced form wins over the loose form); "all targets hit"
    /// implies tp4 only when tp4 is not already in this message's list.
    pub fn parse_update(&self, text: &str) -> ParsedUpdate {
        let pair = self.pair_symbol(text);
        let mut events = Vec::new();

        for rule in &self.tp_rules {
            if let Some(price) = capture_f64(&rule.full, text) {
                events.push(UpdateEvent { kind: rule.kind, price: Some(price) });
            } else if rule.loose.is_match(text) {
                events.push(UpdateEvent { kind: rule.kind, price: None });
            }
        }

        if self.sl_label.is_match(text) {
            events.push(UpdateEvent {
                kind: UpdateKind::Sl,
                price: capture_f64(&self.sl_price, text),
            });
        }

        if self.all_targets.is_match(text)
            && !events.iter().any(|e| e.kind == UpdateKind::Tp4)
        {
            events.push(UpdateEvent { kind: UpdateKind::Tp4, price: None });
        }

        ParsedUpdate { pair, events }
    }

    /// First permalink entity whose URL ends in a numeric message id.
    pub fn linked_msg_id(&self, msg: &ChannelMessage) -> Option<i64> {
        msg.link_entities.iter().find_map(|entity| {
            self.link_tail
                .captures(&entity.url)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
    }

    fn pair_symbol(&self, text: &str) -> Option<String> {
        self.pair
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_uppercase())
    }
}

fn capture_f64(rx: &Regex, text: &str) -> Option<f64> {
    rx.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
