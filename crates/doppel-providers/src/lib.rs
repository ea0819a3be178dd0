//! # doppel-providers
//!
//! Generative backend implementations for Doppel.

pub mod ollama;

pub use ollama::OllamaProvider;
