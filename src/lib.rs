pub mod api;
pub mod config;
pub mod humanize;
pub mod observability;
pub mod queue;
pub mod store;
pub mod worker;
