//! Core library components.

pub mod cache;
pub mod domain;
pub mod engine;
pub mod exchange;
pub mod notify;
pub mod service;
pub mod store;
pub mod tracker;
