//! `SeaORM` Entity for trading calls

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "signals")]
pub struct Model {
    /// Opaque uuid, generated on first insert and stable across edits.
    #[sea_orm(primary_key, auto_increment = false)]
    pub signal_id: String,
    pub channel_id: i64,
    /// Source message id; the natural dedup key for re-ingestion.
    #[sea_orm(unique)]
    pub call_message_id: i64,
    #[sea_orm(column_type = "Text")]
    pub message_link: String,
    pub pair: String,
    pub entry: f64,
    pub target1: Option<f64>,
    pub target2: Option<f64>,
    pub target3: Option<f64>,
    pub target4: Option<f64>,
    pub stop1: Option<f64>,
    pub stop2: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub risk_level: Option<String>,
    pub volume_rank_num: Option<i32>,
    pub volume_rank_den: Option<i32>,
    pub created_at: DateTimeUtc,
    /// "open", "tp1".."tp3", "closed_win", "closed_loss"
    pub status: String,
    #[sea_orm(column_type = "Text")]
    pub raw_text: String,
    pub text_hash: String,
    pub edit_date: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::signal_updates::Entity")]
    SignalUpdates,
}

impl Related<super::signal_updates::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SignalUpdates.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
