//! SQLite persistence for the WhatsApp device session.
//!
//! `whatsapp-rust` externalizes all credential storage behind its `Backend`
//! trait bundle (SignalStore + AppSyncStore + ProtocolStore + DeviceStore).
//! This module implements that bundle with sqlx, so the pairing survives a
//! process restart. Device credentials are an external collaborator of the
//! orchestration core — nothing in here is consulted by the dispatcher
//! except the LID↔phone mapping surfaced through `lid_for_phone`.

mod appsync;
mod device;
mod protocol;
mod signal;

use sqlx::{Pool, Sqlite, SqlitePool};
use wacore::store::traits::ProtocolStore;

/// SQL schema for the session database.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS signal_identity_keys (
    address TEXT PRIMARY KEY,
    key_data BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS signal_sessions (
    address TEXT PRIMARY KEY,
    record BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS signal_prekeys (
    id INTEGER PRIMARY KEY,
    record BLOB NOT NULL,
    uploaded INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS signal_signed_prekeys (
    id INTEGER PRIMARY KEY,
    record BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS signal_sender_keys (
    address TEXT PRIMARY KEY,
    record BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS appstate_keys (
    key_id BLOB PRIMARY KEY,
    key_data BLOB NOT NULL,
    timestamp INTEGER NOT NULL DEFAULT 0,
    fingerprint BLOB
);
CREATE TABLE IF NOT EXISTS appstate_versions (
    collection TEXT PRIMARY KEY,
    state TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS appstate_macs (
    collection TEXT NOT NULL,
    index_mac BLOB NOT NULL,
    version INTEGER NOT NULL,
    value_mac BLOB NOT NULL,
    PRIMARY KEY (collection, index_mac)
);
CREATE TABLE IF NOT EXISTS group_skdm_sent (
    group_jid TEXT NOT NULL,
    device_jid TEXT NOT NULL,
    PRIMARY KEY (group_jid, device_jid)
);
CREATE TABLE IF NOT EXISTS lid_phone_map (
    lid TEXT PRIMARY KEY,
    phone_number TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT 0,
    learning_source TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS session_base_keys (
    address TEXT NOT NULL,
    message_id TEXT NOT NULL,
    base_key BLOB NOT NULL,
    PRIMARY KEY (address, message_id)
);
CREATE TABLE IF NOT EXISTS user_device_lists (
    user TEXT PRIMARY KEY,
    record TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS sender_key_forgets (
    group_jid TEXT NOT NULL,
    participant TEXT NOT NULL,
    PRIMARY KEY (group_jid, participant)
);
CREATE TABLE IF NOT EXISTS device_record (
    id INTEGER PRIMARY KEY,
    data BLOB NOT NULL
);
";

/// SQLx-backed WhatsApp session store.
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

impl SessionStore {
    /// Open (or create) the session database and initialize the schema.
    pub async fn new(db_path: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(&format!("sqlite:{db_path}?mode=rwc")).await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Look up the alias LID the server has taught us for a phone number.
    ///
    /// Returns the raw LID string, or `None` if the mapping has not been
    /// learned yet.
    pub async fn lid_for_phone(&self, phone: &str) -> Option<String> {
        self.get_pn_mapping(phone)
            .await
            .ok()
            .flatten()
            .map(|entry| entry.lid)
    }
}
