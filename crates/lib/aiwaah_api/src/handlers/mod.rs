//! Request handlers.

pub mod chat;
pub mod exchange;
pub mod health;
pub mod history;
