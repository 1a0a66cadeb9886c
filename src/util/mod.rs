pub mod api_util;
pub mod arbiter;
pub mod auth;
pub mod auto_fetch;
pub mod cache;
pub mod config;
pub mod generator;
pub mod ledger;
pub mod release;
pub mod scoreboard;
pub mod script;
pub mod scoring;
