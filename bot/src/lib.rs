pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod raid;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod ui;
pub mod venues;
