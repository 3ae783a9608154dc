//! Core domain types
//!
//! This module contains the core domain structures used across Ferry crates.
//! These types represent the fundamental business entities and are shared between
//! the engine (which mutates them) and the client (which moves them over the wire).

pub mod catalog;
pub mod dependency;
pub mod environment;
pub mod log;
pub mod pipeline;
pub mod tenant;
pub mod transport;
pub mod workflow;
