// src/services/mod.rs
//! Business logic and API.

pub mod api_server;
pub mod issuer;
pub mod registry_reader;
pub mod role_authority;
