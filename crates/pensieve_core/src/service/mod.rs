//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own event validation and cross-collection cascades so the API layer
//!   never touches storage directly.

pub mod catalog_service;
pub mod event_validator;
pub mod relation_service;
