use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use shared::{get_db_connection, Config};
use tracing::{error, info};

use ingest::driver::{IngestOptions, Ingestor};
use ingest::source::JsonlSource;
use ingest::store::{DbStore, MemoryStore, SignalStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting signal ingest...");

    let config = Config::from_env()?;

    let store: Arc<dyn SignalStore> = if config.dry_run {
        info!("Dry run: using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        let db = get_db_connection(&config.database_url).await?;
        Migrator::up(&db, None).await?;
        info!("Connected to database, migrations applied");
        Arc::new(DbStore::new(db))
    };

    let mut source = JsonlSource::open(&config.messages_file, config.last_id, config.channel_id)?;

    let opts = IngestOptions {
        per_message_delay: Duration::from_millis(config.per_message_delay_ms),
        strict_edits: config.strict_edits,
    };
    let mut ingestor = Ingestor::new(store.clone(), opts);
    let report = match ingestor.run(&mut source).await {
        Ok(report) => report,
        Err(err) => {
            let report = ingestor.report();
            error!(
                "Ingest aborted: {} (resume with LAST_ID={})",
                err, report.last_processed_id
            );
            return Err(err.into());
        }
    };

    info!("Run summary: {}", report.summary());
    for row in store.recent_signals(10).await? {
        info!(
            "{} {} entry={} status={} ({})",
            row.pair, row.signal_id, row.entry, row.status, row.message_link
        );
    }

    Ok(())
}
