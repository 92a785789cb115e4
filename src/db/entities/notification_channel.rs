use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    /// One of 邮件 / Webhook / 微信推送 / 钉钉推送 / 企业微信推送.
    pub channel_type: String,
    pub enabled: bool,
    /// Tagged JSON deserializing to `notifications::models::ChannelConfig`.
    #[sea_orm(column_type = "JsonBinary")]
    pub config: Json,
    pub default_for_new_monitors: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::monitor_notification::Entity")]
    Bindings,
}

impl Related<super::monitor_notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bindings.def()
    }
}

impl Related<super::monitor::Entity> for Entity {
    fn to() -> RelationDef {
        super::monitor_notification::Relation::Monitor.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::monitor_notification::Relation::Channel.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
