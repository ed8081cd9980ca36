//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate identity resolution, encryption and repository calls into
//!   owner-scoped use-case APIs.
//! - Keep the HTTP boundary decoupled from storage details.

pub mod task_store;
