use crate::{
    context::{Context, GeneratedReply},
    error::DoppelError,
    message::{Address, TransportEvent},
};
use async_trait::async_trait;

/// Messaging transport trait.
///
/// The core never manages connection lifecycle beyond `start`/`stop`; the
/// transport owns pairing, encryption, and delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Start listening. Returns a receiver that yields transport events.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<TransportEvent>, DoppelError>;

    /// Send plain text to an address.
    async fn send_text(&self, to: &Address, text: &str) -> Result<(), DoppelError>;

    /// Show a "composing" presence to the counterpart while a reply is pending.
    async fn send_composing(&self, _to: &Address) -> Result<(), DoppelError> {
        Ok(())
    }

    /// Resolve a phone number to its alias-kind address, if the transport
    /// has learned one. Transports without such a mapping return `None`.
    async fn lookup_address(&self, _phone: &str) -> Result<Option<Address>, DoppelError> {
        Ok(None)
    }

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), DoppelError>;
}

/// Generative backend trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Send a composed context to the backend and get a validated reply.
    async fn complete(&self, context: &Context) -> Result<GeneratedReply, DoppelError>;

    /// Check if the backend is reachable and ready.
    async fn is_available(&self) -> bool;
}
