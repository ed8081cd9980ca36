//! Domain model for owners and their task records.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep persisted shape (`Task`) separate from presentation shape
//!   (`TaskView`) so ciphertext never leaves the store boundary by accident.
//!
//! # Invariants
//! - Every task is owned by exactly one resolved `OwnerId` at creation time.
//! - `Task::encrypted_notes` only ever holds field-cipher envelopes.

pub mod task;
pub mod user;
