//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a clean API for data access with user-scoped methods.

pub mod connection;
pub mod customer;
pub mod oauth_state;
pub mod pending_authorization;

pub use connection::ConnectionRepository;
pub use customer::CustomerRepository;
pub use oauth_state::OAuthStateRepository;
pub use pending_authorization::PendingAuthorizationRepository;
