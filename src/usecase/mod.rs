pub mod cache;
pub mod contracts;
pub mod error;
pub mod feed_address;
pub mod messages;
pub mod notification_log;
pub mod notifications;
