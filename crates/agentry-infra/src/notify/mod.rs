//! Approval notification channels.

pub mod http;

pub use http::{EmailToolNotifier, NotificationServiceNotifier};
