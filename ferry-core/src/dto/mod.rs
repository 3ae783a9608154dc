//! Data Transfer Objects for the artifact service
//!
//! This module contains the request and response bodies exchanged with the
//! artifact directory and transport service. DTOs are lightweight wire
//! shapes; the engine converts them into domain types at the boundary.

pub mod auth;
pub mod configuration;
pub mod transport;
