//! HTTP request handlers.

pub mod exchange;
