//! Data model shared across the gateway

pub mod descriptor;
pub mod domain;
pub mod health;
pub mod record;
