//! # doppel-core
//!
//! Core types, traits, configuration, and error handling for the Doppel
//! autoresponder.

pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod persona;
pub mod sanitize;
pub mod traits;
