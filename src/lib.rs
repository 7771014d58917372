pub mod api;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod models;
pub mod schedule;
pub mod sync;
pub mod writer;

/// Application name for XDG paths
pub const APP_NAME: &str = "moodsort";
