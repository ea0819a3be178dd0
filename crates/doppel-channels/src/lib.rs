//! # doppel-channels
//!
//! Messaging transport integration for Doppel.

pub mod session_store;
pub mod whatsapp;
