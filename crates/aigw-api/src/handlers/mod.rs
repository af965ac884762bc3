//! HTTP request handlers

pub mod catalog;
pub mod meta;
pub mod relay;
