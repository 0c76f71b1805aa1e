//! `SeaORM` Entity for TP/SL events tied to a signal
//!
//! One physical message may carry several distinct event types, so the key
//! is (channel, message, event type); re-ingesting the same event is a no-op.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "signal_updates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub update_message_id: i64,
    /// "tp1".."tp4" or "sl"
    #[sea_orm(primary_key, auto_increment = false)]
    pub update_type: String,
    pub signal_id: String,
    #[sea_orm(column_type = "Text")]
    pub message_link: String,
    /// Price from the message text, or the owning signal's recorded
    /// target/stop price when the text carries none.
    pub price: Option<f64>,
    pub update_at: DateTimeUtc,
    #[sea_orm(column_type = "Text")]
    pub raw_text: String,
    /// Kept for auditing the correlation decision.
    pub reply_to_msg_id: Option<i64>,
    pub linked_msg_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::signals::Entity",
        from = "Column::SignalId",
        to = "super::signals::Column::SignalId",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Signals,
}

impl Related<super::signals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Signals.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
