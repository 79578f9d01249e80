pub mod chain;
pub mod config;
pub mod dedup;
pub mod format;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod signature;
pub mod tracker;
pub mod watcher;
pub mod webhook;
