use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitors")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub monitor_type: String,
    pub active: bool,
    pub interval_seconds: i32,
    pub retries: i32,
    pub retry_interval_seconds: i32,
    /// Consecutive DOWN rows between repeat alerts; 0 disables repeats.
    pub resend_interval: i32,
    pub upside_down: bool,
    #[sea_orm(column_type = "JsonBinary")]
    pub config: Json,
    pub group_id: Option<String>,
    pub description: Option<String>,
    pub last_check_at: Option<ChronoDateTimeUtc>,
    pub last_status: Option<i16>,
    pub last_message: Option<String>,
    pub last_ping: Option<i32>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monitor_group::Entity",
        from = "Column::GroupId",
        to = "super::monitor_group::Column::Id",
        on_delete = "SetNull"
    )]
    Group,

    #[sea_orm(has_many = "super::monitor_status::Entity")]
    StatusHistory,

    #[sea_orm(has_many = "super::monitor_notification::Entity")]
    NotificationBindings,
}

impl Related<super::monitor_group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl Related<super::monitor_status::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl Related<super::notification_channel::Entity> for Entity {
    fn to() -> RelationDef {
        super::monitor_notification::Relation::Channel.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::monitor_notification::Relation::Monitor.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
