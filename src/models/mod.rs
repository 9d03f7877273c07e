//! Data models for platform entities

mod user;

pub use user::*;
