//! Gateway route handlers

pub mod health;
pub mod message;
pub mod peer;
