//! Application layer containing the order/payment lifecycle orchestration.
//!
//! `LifecycleEngine` is the single writer of order and payment statuses. It
//! serializes work per order through `OrderLocks`, hands notifications to a
//! `NotificationQueue`, and is driven in the background by `ExpirySweeper`.

pub mod engine;
pub mod locks;
pub mod notifier;
pub mod sweeper;
