pub mod auth;
pub mod config;
pub mod dataset;
pub mod download;
pub mod pull;
pub mod push;
pub mod stage;
