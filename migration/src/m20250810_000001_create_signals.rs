use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Signals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Signals::SignalId).text().not_null().primary_key())
                    .col(ColumnDef::new(Signals::ChannelId).big_integer().not_null())
                    .col(ColumnDef::new(Signals::CallMessageId).big_integer().not_null().unique_key())
                    .col(ColumnDef::new(Signals::MessageLink).text().not_null())
                    .col(ColumnDef::new(Signals::Pair).string().not_null())
                    .col(ColumnDef::new(Signals::Entry).double().not_null())
                    .col(ColumnDef::new(Signals::Target1).double().null())
                    .col(ColumnDef::new(Signals::Target2).double().null())
                    .col(ColumnDef::new(Signals::Target3).double().null())
                    .col(ColumnDef::new(Signals::Target4).double().null())
                    .col(ColumnDef::new(Signals::Stop1).double().null())
                    .col(ColumnDef::new(Signals::Stop2).double().null())
                    .col(ColumnDef::new(Signals::RiskLevel).text().null())
                    .col(ColumnDef::new(Signals::VolumeRankNum).integer().null())
                    .col(ColumnDef::new(Signals::VolumeRankDen).integer().null())
                    .col(ColumnDef::new(Signals::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Signals::Status).string().not_null().default("open"))
                    .col(ColumnDef::new(Signals::RawText).text().not_null())
                    .col(ColumnDef::new(Signals::TextHash).string().not_null())
                    .col(ColumnDef::new(Signals::EditDate).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_signals_pair")
                    .table(Signals::Table)
                    .col(Signals::Pair)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_signals_status")
                    .table(Signals::Table)
                    .col(Signals::Status)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_signals_callid")
                    .table(Signals::Table)
                    .col(Signals::CallMessageId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Signals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Signals {
    Table,
    SignalId,
    ChannelId,
    CallMessageId,
    MessageLink,
    Pair,
    Entry,
    Target1,
    Target2,
    Target3,
    Target4,
    Stop1,
    Stop2,
    RiskLevel,
    VolumeRankNum,
    VolumeRankDen,
    CreatedAt,
    Status,
    RawText,
    TextHash,
    EditDate,
}
