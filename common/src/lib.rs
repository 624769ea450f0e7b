// Common library shared by the worker binary and the embedding front end

pub mod auth;
pub mod clients;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod models;
pub mod notify;
pub mod retry;
pub mod schedule;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod worker;
