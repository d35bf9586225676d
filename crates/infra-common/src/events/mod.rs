//! Typed notification fan-out

pub mod hub;

pub use hub::{Notification, NotificationHub, Origin, Subscription, SubscriptionHandle};
