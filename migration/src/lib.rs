pub use sea_orm_migration::prelude::*;

mod m20250810_000001_create_signals;
mod m20250810_000002_create_signal_updates;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250810_000001_create_signals::Migration),
            Box::new(m20250810_000002_create_signal_updates::Migration),
        ]
    }
}
