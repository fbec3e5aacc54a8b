//! # QBO Sync Library
//!
//! This library provides the core functionality for the QBO Sync API service:
//! the QuickBooks OAuth connection lifecycle and the customer sync engine.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod maintenance;
pub mod models;
pub mod qbo;
pub mod repositories;
pub mod server;
pub mod sync;
pub mod telemetry;
pub mod token_refresh;
pub use migration;
