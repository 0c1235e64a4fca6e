//! Discord bot core: an expiring local cache of third-party game data with
//! fuzzy name lookup, plus the upstream clients and services around it.

pub mod app;
pub mod bot;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod upstream;
pub mod utils;
