//! Identity resolution — recognizing "the same human" across the two
//! addressing schemes the transport uses.
//!
//! The tracked target has one immutable primary address (resolved from a
//! phone number at setup) and at most one lazily discovered alias address.
//! Alias discovery and its write-through to the contact book happen inside
//! one locked step, so memory and disk cannot disagree across a restart.

use doppel_core::config::TargetConfig;
use doppel_core::message::{Address, AddressKind, InboundMessage};
use doppel_memory::{ContactBook, ContactRecord};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The resolved target.
#[derive(Debug, Clone)]
pub struct TrackedIdentity {
    /// Set once at setup, immutable thereafter.
    pub primary: Address,
    /// Discovered at runtime; never silently rebound to a different value.
    pub alias: Option<Address>,
}

impl TrackedIdentity {
    /// Build from a contact book record.
    pub fn from_record(record: &ContactRecord) -> Self {
        Self {
            primary: Address::from_jid(&record.jid),
            alias: record.lid.as_deref().map(Address::from_jid),
        }
    }
}

/// Outcome of resolving one inbound event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolution {
    pub belongs_to_target: bool,
}

/// Identity and its durable record, mutated together under one lock.
struct IdentityState {
    identity: TrackedIdentity,
    book: ContactBook,
}

/// Per-event membership decisions plus alias latching.
pub struct IdentityResolver {
    state: Mutex<IdentityState>,
    trigger_prefix: String,
    auto_link: bool,
}

impl IdentityResolver {
    pub fn new(identity: TrackedIdentity, book: ContactBook, policy: &TargetConfig) -> Self {
        Self {
            state: Mutex::new(IdentityState { identity, book }),
            trigger_prefix: policy.trigger_prefix.clone(),
            auto_link: policy.auto_link_alias,
        }
    }

    /// Copy out the current identity (for routing replies).
    pub async fn identity(&self) -> TrackedIdentity {
        self.state.lock().await.identity.clone()
    }

    /// If the text starts with the manual-trigger prefix, return the rest.
    pub fn strip_trigger<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.trigger_prefix.is_empty() {
            return None;
        }
        text.strip_prefix(&self.trigger_prefix).map(str::trim)
    }

    /// Decide whether an event belongs to the tracked conversation,
    /// performing alias discovery where the policy allows it.
    pub async fn resolve(&self, event: &InboundMessage) -> Resolution {
        // Broadcast/status traffic never belongs, whatever else matches.
        if event.chat.kind == AddressKind::Broadcast
            || event.sender.kind == AddressKind::Broadcast
        {
            return Resolution::default();
        }
        // Single-target mode: group chats are excluded outright.
        if event.is_group() {
            return Resolution::default();
        }

        let mut belongs = {
            let state = self.state.lock().await;
            let id = &state.identity;
            let hits_primary =
                event.chat.same_user(&id.primary) || event.sender.same_user(&id.primary);
            let hits_alias = id
                .alias
                .as_ref()
                .map(|a| event.chat.same_user(a) || event.sender.same_user(a))
                .unwrap_or(false);
            hits_primary || hits_alias
        };

        // First-contact discovery (opt-in): a counterpart message in an
        // unknown alias-kind chat binds that chat as the alias.
        if !belongs && !event.from_self && self.auto_link && event.chat.kind == AddressKind::Alias
        {
            if self.bind_alias(&event.chat, "first-contact").await {
                belongs = true;
            }
        }

        // Manual latch: a self-authored trigger forces the event in and may
        // discover the alias from the chat it was sent to.
        if !belongs && event.from_self && self.strip_trigger(&event.text).is_some() {
            belongs = true;
            if event.chat.kind == AddressKind::Alias {
                self.bind_alias(&event.chat, "manual-latch").await;
            }
        }

        Resolution {
            belongs_to_target: belongs,
        }
    }

    /// Bind an alias address, persisting it in the same step.
    ///
    /// Returns true only when a new alias was bound. Re-binding the same
    /// alias is a silent no-op; binding a different one while an alias is
    /// held is refused. A failed persistence write keeps the in-memory
    /// binding for this process lifetime and logs the condition.
    pub async fn bind_alias(&self, addr: &Address, source: &str) -> bool {
        if addr.kind != AddressKind::Alias || addr.user.is_empty() {
            return false;
        }

        let mut state = self.state.lock().await;
        match &state.identity.alias {
            Some(existing) if existing.same_user(addr) => false,
            Some(existing) => {
                warn!(
                    "refusing to rebind alias: {} already held, got {} ({source})",
                    existing.user, addr.user
                );
                false
            }
            None => {
                state.identity.alias = Some(addr.clone());
                let primary_jid = state.identity.primary.jid.clone();
                if let Err(e) = state.book.set_alias(&primary_jid, &addr.jid) {
                    warn!("alias {} held in memory only, persistence failed: {e}", addr.jid);
                } else {
                    info!("alias bound: {} ({source})", addr.jid);
                }
                true
            }
        }
    }
}
