//! SeaORM entities for the monitoring schema.

pub mod monitor;
pub mod monitor_group;
pub mod monitor_notification;
pub mod monitor_status;
pub mod notification_channel;
pub mod status_page;
pub mod status_page_monitor;

pub mod prelude {
    pub use super::monitor::Entity as Monitor;
    pub use super::monitor::Model as MonitorModel;

    pub use super::monitor_status::Entity as MonitorStatus;
    pub use super::monitor_status::Model as MonitorStatusModel;

    pub use super::notification_channel::Entity as NotificationChannel;
    pub use super::notification_channel::Model as NotificationChannelModel;

    pub use super::monitor_notification::Entity as MonitorNotification;
    pub use super::monitor_notification::Model as MonitorNotificationModel;

    pub use super::monitor_group::Entity as MonitorGroup;
    pub use super::monitor_group::Model as MonitorGroupModel;

    pub use super::status_page::Entity as StatusPage;
    pub use super::status_page_monitor::Entity as StatusPageMonitor;
}
