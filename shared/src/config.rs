use dotenv::dotenv;

pub struct Config {
    pub database_url: String,
    /// Restrict ingestion to one source channel; `None` accepts any channel
    /// present in the message dump.
    pub channel_id: Option<i64>,
    /// Resume checkpoint: only messages with a higher id are processed.
    pub last_id: i64,
    pub per_message_delay_ms: u64,
    /// Reject edited calls whose edit timestamp is not newer than the one
    /// already stored.
    pub strict_edits: bool,
    /// Run against the in-memory store instead of the database.
    pub dry_run: bool,
    pub messages_file: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenv().ok();

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://signals.db?mode=rwc".to_string()),
            channel_id: match std::env::var("CHANNEL_ID") {
                Ok(raw) => Some(raw.parse()?),
                Err(_) => None,
            },
            last_id: std::env::var("LAST_ID")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,
            per_message_delay_ms: std::env::var("PER_MESSAGE_DELAY_MS")
                .unwrap_or_else(|_| "80".to_string())
                .parse()?,
            strict_edits: std::env::var("STRICT_EDITS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            dry_run: std::env::var("DRY_RUN")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            messages_file: std::env::var("MESSAGES_FILE")
                .unwrap_or_else(|_| "./messages.jsonl".to_string()),
        })
    }
}
