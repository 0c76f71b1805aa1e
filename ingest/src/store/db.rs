use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect,
};
use shared::entity::{signal_updates, signals};
use shared::models::{
    message_link, text_hash, CallFields, ChannelMessage, SignalStatus, UpdateKind,
};
use uuid::Uuid;

use super::{FallbackPrices, Owner, OwnerRow, SignalStore, StoreError};

/// SeaORM-backed store. The same code serves Postgres and SQLite; the
/// `OnConflict` builders render the correct upsert syntax per backend.
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_signal(
        &self,
        channel_id: i64,
        call_message_id: i64,
    ) -> Result<Option<signals::Model>, StoreError> {
        let row = signals::Entity::find()
            .filter(signals::Column::ChannelId.eq(channel_id))
            .filter(signals::Column::CallMessageId.eq(call_message_id))
            .one(&self.db)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl SignalStore for DbStore {
    async fn upsert_signal(
        &self,
        msg: &ChannelMessage,
        fields: &CallFields,
    ) -> Result<String, StoreError> {
        let model = signals::ActiveModel {
            signal_id: Set(Uuid::new_v4().to_string()),
            channel_id: Set(msg.channel_id),
            call_message_id: Set(msg.id),
            message_link: Set(message_link(msg.channel_id, msg.id)),
            pair: Set(fields.pair.clone()),
            entry: Set(fields.entry),
            target1: Set(fields.target1),
            target2: Set(fields.target2),
            target3: Set(fields.target3),
            target4: Set(fields.target4),
            stop1: Set(fields.stop1),
            stop2: Set(fields.stop2),
            risk_level: Set(fields.risk_level.clone()),
            volume_rank_num: Set(fields.volume_rank_num),
            volume_rank_den: Set(fields.volume_rank_den),
            created_at: Set(msg.date),
            status: Set(SignalStatus::Open.as_str().to_string()),
            raw_text: Set(msg.text.clone()),
            text_hash: Set(text_hash(&msg.text)),
            edit_date: Set(None),
        };

        // signal_id and status are deliberately absent from the conflict
        // update set: both survive a re-ingested call.
        signals::Entity::insert(model)
            .on_conflict(
                OnConflict::column(signals::Column::CallMessageId)
                    .update_columns([
                        signals::Column::ChannelId,
                        signals::Column::MessageLink,
                        signals::Column::Pair,
                        signals::Column::Entry,
                        signals::Column::Target1,
                        signals::Column::Target2,
                        signals::Column::Target3,
                        signals::Column::Target4,
                        signals::Column::Stop1,
                        signals::Column::Stop2,
                        signals::Column::RiskLevel,
                        signals::Column::VolumeRankNum,
                        signals::Column::VolumeRankDen,
                        signals::Column::CreatedAt,
                        signals::Column::RawText,
                        signals::Column::TextHash,
                        signals::Column::EditDate,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let row = self
            .find_signal(msg.channel_id, msg.id)
            .await?
            .ok_or_else(|| sea_orm::DbErr::RecordNotFound("signal vanished after upsert".into()))?;
        Ok(row.signal_id)
    }

    async fn insert_update(
        &self,
        signal_id: &str,
        msg: &ChannelMessage,
        kind: UpdateKind,
        price: Option<f64>,
        linked_msg_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let model = signal_updates::ActiveModel {
            channel_id: Set(msg.channel_id),
            update_message_id: Set(msg.id),
            update_type: Set(kind.as_str().to_string()),
            signal_id: Set(signal_id.to_string()),
            message_link: Set(message_link(msg.channel_id, msg.id)),
            price: Set(price),
            update_at: Set(msg.date),
            raw_text: Set(msg.text.clone()),
            reply_to_msg_id: Set(msg.reply_to_msg_id),
            linked_msg_id: Set(linked_msg_id),
        };

        let inserted = signal_updates::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    signal_updates::Column::ChannelId,
                    signal_updates::Column::UpdateMessageId,
                    signal_updates::Column::UpdateType,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(inserted > 0)
    }

    async fn apply_status(
        &self,
        signal_id: &str,
        current: SignalStatus,
        event: UpdateKind,
    ) -> Result<SignalStatus, StoreError> {
        let next = current.next(event);
        if next != current {
            signals::Entity::update_many()
                .col_expr(signals::Column::Status, Expr::value(next.as_str()))
                .filter(signals::Column::SignalId.eq(signal_id))
                .exec(&self.db)
                .await?;
        }
        Ok(next)
    }

    async fn find_by_call_message(
        &self,
        channel_id: i64,
        call_message_id: i64,
    ) -> Result<Option<Owner>, StoreError> {
        match self.find_signal(channel_id, call_message_id).await? {
            Some(row) => Ok(Some(Owner {
                signal_id: row.signal_id,
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
        let open_statuses = [
            SignalStatus::Open.as_str(),
            SignalStatus::Tp1.as_str(),
            SignalStatus::Tp2.as_str(),
            SignalStatus::Tp3.as_str(),
        ];
        let row = signals::Entity::find()
            .filter(signals::Column::ChannelId.eq(channel_id))
            .filter(signals::Column::Pair.eq(pair))
            .filter(signals::Column::CallMessageId.lt(before_id))
            .filter(signals::Column::Status.is_in(open_statuses))
            .order_by_desc(signals::Column::CallMessageId)
            .one(&self.db)
            .await?;
        match row {
            Some(row) => Ok(Some(OwnerRow {
                signal_id: row.signal_id,
                call_message_id: row.call_message_id,
                status: row.status.parse()?,
            })),
            None => Ok(None),
        }
    }

    async fn fallback_prices(&self, signal_id: &str) -> Result<Option<FallbackPrices>, StoreError> {
        let row = signals::Entity::find_by_id(signal_id).one(&self.db).await?;
        Ok(row.map(|r| FallbackPrices {
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
        let Some(row) = self.find_signal(msg.channel_id, msg.id).await? else {
            return Ok(false);
        };
        if strict {
            if let (Some(stored), Some(incoming)) = (row.edit_date, msg.edit_date) {
                if stored >= incoming {
                    return Ok(false);
                }
            }
        }

        let mut model = row.into_active_model();
        model.entry = Set(fields.entry);
        model.target1 = Set(fields.target1);
        model.target2 = Set(fields.target2);
        model.target3 = Set(fields.target3);
        model.target4 = Set(fields.target4);
        model.stop1 = Set(fields.stop1);
        model.stop2 = Set(fields.stop2);
        model.risk_level = Set(fields.risk_level.clone());
        model.volume_rank_num = Set(fields.volume_rank_num);
        model.volume_rank_den = Set(fields.volume_rank_den);
        model.raw_text = Set(msg.text.clone());
        model.text_hash = Set(text_hash(&msg.text));
        model.edit_date = Set(msg.edit_date);
        signals::Entity::update(model).exec(&self.db).await?;
        Ok(true)
    }

    async fn recent_signals(
        &self,
        limit: u64,
    ) -> Result<Vec<signals::Model>, StoreError> {
        let rows = signals::Entity::find()
            .order_by_desc(signals::Column::CallMessageId)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows)
    }
}
