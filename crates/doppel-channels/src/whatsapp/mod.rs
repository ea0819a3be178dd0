//! WhatsApp transport — pure Rust implementation via `whatsapp-rust`.
//!
//! Uses the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! Pairing is done by scanning a QR code printed to the terminal; the
//! session is persisted to `{data_dir}/whatsapp_session/session.db`.

mod bot;
mod events;
mod qr;
mod send;


use crate::session_store::SessionStore;
use async_trait::async_trait;
use doppel_core::{
    config::shellexpand,
    error::DoppelError,
    message::{Address, AddressKind, TransportEvent},
    traits::Transport,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use wacore_binary::jid::Jid;

use send::{retry_send, split_message};

/// WhatsApp message length limit per send.
const MAX_TEXT_LEN: usize = 4096;

/// WhatsApp transport using the WhatsApp Web protocol.
pub struct WhatsAppTransport {
    data_dir: String,
    /// Client handle for sending — set once the bot connects.
    client: Arc<Mutex<Option<Arc<whatsapp_rust::client::Client>>>>,
    /// Message IDs we sent — used to discard our own echo events.
    sent_ids: Arc<Mutex<HashSet<String>>>,
    /// Session store handle — kept for LID↔phone lookups.
    store: Arc<Mutex<Option<Arc<SessionStore>>>>,
}

impl WhatsAppTransport {
    /// Create a new transport rooted at `data_dir`.
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
            client: Arc::new(Mutex::new(None)),
            sent_ids: Arc::new(Mutex::new(HashSet::new())),
            store: Arc::new(Mutex::new(None)),
        }
    }

    /// Check if the client is currently connected.
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Get the session database path, creating the directory if needed.
    pub(super) fn session_db_path(&self) -> String {
        let dir = shellexpand(&self.data_dir);
        let session_dir = format!("{dir}/whatsapp_session");
        let _ = std::fs::create_dir_all(&session_dir);
        format!("{session_dir}/session.db")
    }

    /// Send plain text to a JID string, chunked at the length limit.
    async fn send_raw(&self, jid_str: &str, text: &str) -> Result<(), DoppelError> {
        let client_guard = self.client.lock().await;
        let client = client_guard
            .as_ref()
            .ok_or_else(|| DoppelError::Transport("whatsapp client not connected".into()))?;

        let jid: Jid = jid_str
            .parse()
            .map_err(|e| DoppelError::Transport(format!("invalid whatsapp JID '{jid_str}': {e}")))?;

        for chunk in split_message(text, MAX_TEXT_LEN) {
            let msg = waproto::whatsapp::Message {
                conversation: Some(chunk),
                ..Default::default()
            };
            let msg_id = retry_send(client, &jid, msg).await?;
            // Track the sent ID so the echo event is discarded.
            self.sent_ids.lock().await.insert(msg_id);
        }

        Ok(())
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, DoppelError> {
        let (tx, rx) = mpsc::channel(64);
        self.build_and_run_bot(tx).await?;
        info!("WhatsApp transport started");
        Ok(rx)
    }

    async fn send_text(&self, to: &Address, text: &str) -> Result<(), DoppelError> {
        self.send_raw(&to.jid, text).await
    }

    async fn send_composing(&self, to: &Address) -> Result<(), DoppelError> {
        let client_guard = self.client.lock().await;
        if let Some(ref client) = *client_guard {
            let jid: Jid = to.jid.parse().map_err(|e| {
                DoppelError::Transport(format!("invalid whatsapp JID '{}': {e}", to.jid))
            })?;
            let _ = client.chatstate().send_composing(&jid).await;
        }
        Ok(())
    }

    async fn lookup_address(&self, phone: &str) -> Result<Option<Address>, DoppelError> {
        let store = self.store.lock().await.clone();
        let Some(store) = store else {
            return Ok(None);
        };

        Ok(store.lid_for_phone(phone).await.map(|lid| {
            if lid.contains('@') {
                Address::from_jid(&lid)
            } else {
                Address::new(AddressKind::Alias, &lid, &format!("{lid}@lid"))
            }
        }))
    }

    async fn stop(&self) -> Result<(), DoppelError> {
        info!("WhatsApp transport stopped");
        *self.client.lock().await = None;
        Ok(())
    }
}
