//! Incoming WhatsApp message handling — unwrapping and forwarding.
//!
//! The transport does no identity filtering: every plain-text message event
//! (including our own account's, which the dispatcher needs for the manual
//! latch) is converted and forwarded. Only echoes of messages this process
//! sent are discarded here.

use chrono::Utc;
use doppel_core::message::{Address, AddressKind, InboundMessage, TransportEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Process one incoming WhatsApp message event.
pub(super) async fn handle_message(
    msg: waproto::whatsapp::Message,
    info: wacore::types::message::MessageInfo,
    tx: &mpsc::Sender<TransportEvent>,
    sent_ids: &Arc<Mutex<HashSet<String>>>,
) {
    if sent_ids.lock().await.remove(&info.id) {
        debug!("skipping own echo: {}", info.id);
        return;
    }

    // Unwrap nested wrappers (device_sent, ephemeral, view_once).
    let inner = msg
        .device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(&msg);

    let text = inner
        .conversation
        .as_deref()
        .or_else(|| {
            inner
                .extended_text_message
                .as_ref()
                .and_then(|e| e.text.as_deref())
        })
        .unwrap_or("");

    // Plain text only — media and everything else is out of scope.
    if text.is_empty() {
        return;
    }

    let sender = Address::from_jid(&info.source.sender.to_string());
    let mut chat = Address::from_jid(&info.source.chat.to_string());
    if info.source.is_group {
        chat.kind = AddressKind::Group;
    }

    debug!(
        "WA msg: from_me={}, sender={}, chat={} ({:?})",
        info.source.is_from_me, sender.user, chat.user, chat.kind,
    );

    let event = TransportEvent::Message(InboundMessage {
        id: Uuid::new_v4(),
        sender,
        chat,
        text: text.to_string(),
        from_self: info.source.is_from_me,
        timestamp: Utc::now(),
    });

    if tx.send(event).await.is_err() {
        info!("whatsapp transport receiver dropped");
    }
}
