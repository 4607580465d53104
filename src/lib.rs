// Library exports for Potluck
// This allows integration tests and the binary to share the router and state

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod rating;
pub mod routes;
pub mod state;
pub mod storage;
pub mod validate;
