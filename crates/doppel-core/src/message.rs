use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which addressing scheme a transport address belongs to.
///
/// WhatsApp refers to the same human through two distinct schemes: the
/// stable phone-number JID and a server-assigned LID. Both must be
/// recognized as "the tracked human".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// Stable phone-number address (`@s.whatsapp.net`).
    Primary,
    /// Backend-assigned secondary address (`@lid`).
    Alias,
    /// Group chat (`@g.us`).
    Group,
    /// Status/broadcast pseudo-chat.
    Broadcast,
    /// Anything else the transport surfaces.
    Other,
}

/// An opaque transport address with a kind tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressKind,
    /// User component — the part identity matching compares.
    pub user: String,
    /// Full transport identifier, used for routing sends.
    pub jid: String,
}

impl Address {
    pub fn new(kind: AddressKind, user: &str, jid: &str) -> Self {
        Self {
            kind,
            user: user.to_string(),
            jid: jid.to_string(),
        }
    }

    /// Classify a raw JID string by its server part.
    pub fn from_jid(jid: &str) -> Self {
        let (user, server) = jid.split_once('@').unwrap_or((jid, ""));
        let kind = if user == "status" {
            AddressKind::Broadcast
        } else {
            match server {
                "s.whatsapp.net" => AddressKind::Primary,
                "lid" => AddressKind::Alias,
                "g.us" => AddressKind::Group,
                "broadcast" => AddressKind::Broadcast,
                _ => AddressKind::Other,
            }
        };
        Self {
            kind,
            user: user.to_string(),
            jid: jid.to_string(),
        }
    }

    /// Whether two addresses denote the same user component.
    pub fn same_user(&self, other: &Address) -> bool {
        !self.user.is_empty() && self.user == other.user
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.jid)
    }
}

/// An event surfaced by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A live inbound (or own-device outbound) message.
    Message(InboundMessage),
    /// A batch of older turns delivered by the server on (re)connect.
    HistorySync(HistorySyncBatch),
}

/// A single message event from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: Uuid,
    /// Who authored the message.
    pub sender: Address,
    /// The conversation the message arrived in.
    pub chat: Address,
    /// Plain text content. Non-text messages are dropped at the transport.
    pub text: String,
    /// Authored by our own account (possibly from another linked device).
    pub from_self: bool,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn is_group(&self) -> bool {
        self.chat.kind == AddressKind::Group
    }
}

/// Older turns for one chat, synced from the server.
#[derive(Debug, Clone)]
pub struct HistorySyncBatch {
    pub chat: Address,
    pub turns: Vec<Turn>,
}

/// Who spoke a turn of the tracked conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// Our own account — either a generated reply or a manual trigger.
    Me,
    /// The tracked counterpart.
    Them,
}

/// One turn of the tracked conversation. Append order is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: &str) -> Self {
        Self {
            speaker,
            text: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_kind_from_jid() {
        assert_eq!(
            Address::from_jid("15551234567@s.whatsapp.net").kind,
            AddressKind::Primary
        );
        assert_eq!(Address::from_jid("98765432101@lid").kind, AddressKind::Alias);
        assert_eq!(
            Address::from_jid("120363001234567890@g.us").kind,
            AddressKind::Group
        );
        assert_eq!(
            Address::from_jid("status@broadcast").kind,
            AddressKind::Broadcast
        );
    }

    #[test]
    fn test_address_user_component() {
        let addr = Address::from_jid("15551234567@s.whatsapp.net");
        assert_eq!(addr.user, "15551234567");
        assert_eq!(addr.jid, "15551234567@s.whatsapp.net");
    }

    #[test]
    fn test_same_user_ignores_kind() {
        let a = Address::new(AddressKind::Primary, "111", "111@s.whatsapp.net");
        let b = Address::new(AddressKind::Other, "111", "111@c.us");
        assert!(a.same_user(&b));
    }

    #[test]
    fn test_same_user_rejects_empty() {
        let a = Address::new(AddressKind::Primary, "", "");
        let b = Address::new(AddressKind::Primary, "", "");
        assert!(!a.same_user(&b));
    }
}
