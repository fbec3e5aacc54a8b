//! # Data Models
//!
//! This module contains all the data models used throughout the QBO Sync API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod customer;
pub mod oauth_state;
pub mod pending_authorization;

pub use connection::Entity as Connection;
pub use customer::Entity as Customer;
pub use oauth_state::Entity as OauthState;
pub use pending_authorization::Entity as PendingAuthorization;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "qbo-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
