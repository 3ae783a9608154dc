//! Ferry Core
//!
//! Core types and abstractions for the Ferry deployment pipeline.
//!
//! This crate contains:
//! - Domain types: Core business entities (stages, workflows, configuration, dependencies)
//! - DTOs: Data transfer objects exchanged with the artifact service

pub mod domain;
pub mod dto;
