//! Database models split into domain-specific modules.

pub mod common;
pub mod event_log;
pub mod handling_record;
pub mod user;

pub use event_log::*;
pub use handling_record::*;
pub use user::*;
