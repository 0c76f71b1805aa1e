use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SignalUpdates::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SignalUpdates::ChannelId).big_integer().not_null())
                    .col(ColumnDef::new(SignalUpdates::UpdateMessageId).big_integer().not_null())
                    .col(ColumnDef::new(SignalUpdates::UpdateType).string().not_null())
                    .col(ColumnDef::new(SignalUpdates::SignalId).text().not_null())
                    .col(ColumnDef::new(SignalUpdates::MessageLink).text().not_null())
                    .col(ColumnDef::new(SignalUpdates::Price).double().null())
                    .col(ColumnDef::new(SignalUpdates::UpdateAt).timestamp().not_null())
                    .col(ColumnDef::new(SignalUpdates::RawText).text().not_null())
                    .col(ColumnDef::new(SignalUpdates::ReplyToMsgId).big_integer().null())
                    .col(ColumnDef::new(SignalUpdates::LinkedMsgId).big_integer().null())
                    .primary_key(
                        Index::create()
                            .col(SignalUpdates::ChannelId)
                            .col(SignalUpdates::UpdateMessageId)
                            .col(SignalUpdates::UpdateType),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_updates_sid")
                    .table(SignalUpdates::Table)
                    .col(SignalUpdates::SignalId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_updates_uid")
                    .table(SignalUpdates::Table)
                    .col(SignalUpdates::UpdateMessageId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SignalUpdates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SignalUpdates {
    Table,
    ChannelId,
    UpdateMessageId,
    UpdateType,
    SignalId,
    MessageLink,
    Price,
    UpdateAt,
    RawText,
    ReplyToMsgId,
    LinkedMsgId,
}
