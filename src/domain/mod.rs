//! Domain model: orders, payment intents, notifications, and the ports the
//! lifecycle engine talks to.

pub mod money;
pub mod notification;
pub mod order;
pub mod pagination;
pub mod payment;
pub mod ports;
