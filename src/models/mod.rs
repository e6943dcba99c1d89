//! Domain value types shared by services and handlers.

pub mod identity;
pub mod money;

pub use identity::{normalize_email, Identity};
