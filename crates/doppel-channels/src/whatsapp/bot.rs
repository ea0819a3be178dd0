//! Bot lifecycle — building and running the WhatsApp bot.

use super::events::handle_message;
use super::qr::render_qr_terminal;
use super::WhatsAppTransport;
use crate::session_store::SessionStore;
use doppel_core::{error::DoppelError, message::TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wacore::types::events::Event;
use whatsapp_rust::bot::Bot;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

impl WhatsAppTransport {
    /// Build the bot with the event handler and run it in the background.
    pub(super) async fn build_and_run_bot(
        &self,
        tx: mpsc::Sender<TransportEvent>,
    ) -> Result<(), DoppelError> {
        let db_path = self.session_db_path();
        info!("WhatsApp bot building (session: {db_path})...");

        let backend = Arc::new(
            SessionStore::new(&db_path)
                .await
                .map_err(|e| DoppelError::Transport(format!("session store init failed: {e}")))?,
        );
        *self.store.lock().await = Some(backend.clone());

        let client_handle = self.client.clone();
        let client_for_event = self.client.clone();
        let sent_ids_for_event = self.sent_ids.clone();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some("DOPPEL".to_string()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let tx = tx.clone();
                let client_store = client_for_event.clone();
                let sent_ids = sent_ids_for_event.clone();
                async move {
                    match event {
                        Event::PairingQrCode { code, .. } => {
                            info!("WhatsApp QR code generated — scan with your phone to pair");
                            match render_qr_terminal(&code) {
                                Ok(qr) => println!("{qr}"),
                                Err(e) => warn!("failed to render QR code: {e}"),
                            }
                        }
                        Event::PairSuccess(_) => {
                            info!("WhatsApp pairing successful");
                        }
                        Event::Connected(_) => {
                            info!("WhatsApp connected");
                            *client_store.lock().await = Some(client);
                        }
                        Event::Disconnected(_) => {
                            warn!("WhatsApp disconnected");
                            *client_store.lock().await = None;
                        }
                        Event::LoggedOut(_) => {
                            warn!("WhatsApp logged out — session invalidated");
                            *client_store.lock().await = None;
                        }
                        Event::Message(msg, info) => {
                            handle_message(*msg, info, &tx, &sent_ids).await;
                        }
                        _ => {}
                    }
                }
            })
            .build()
            .await
            .map_err(|e| DoppelError::Transport(format!("whatsapp bot build failed: {e}")))?;

        // Store the client reference immediately if already paired.
        *client_handle.lock().await = Some(bot.client());

        let _handle = bot
            .run()
            .await
            .map_err(|e| DoppelError::Transport(format!("whatsapp bot run failed: {e}")))?;

        info!("WhatsApp bot started");
        Ok(())
    }
}
