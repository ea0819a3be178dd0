//! # doppel-memory
//!
//! The rolling in-memory conversation history and the durable contact book
//! (target-identity record) for Doppel.

pub mod contacts;
pub mod history;

pub use contacts::{sanitize_phone, ContactBook, ContactRecord};
pub use history::History;
