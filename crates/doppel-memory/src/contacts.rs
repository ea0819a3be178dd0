//! The durable target-identity record: an exported contact book.
//!
//! A JSON file keyed by JID, produced by a contact export, holding the
//! primary JID and (once discovered) the alias LID for each contact. Read
//! once at startup to resolve the configured phone number; the alias field
//! is rewritten in place whenever the resolver latches one, synchronously,
//! so a restart resumes with the same identity.

use doppel_core::error::DoppelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Strip everything but digits from a phone number.
pub fn sanitize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// One exported contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub jid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// On-disk shape of the export.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ContactsFile {
    #[serde(default)]
    exported_at: String,
    #[serde(default)]
    contacts: HashMap<String, ContactRecord>,
}

/// The contact book, loaded into memory with write-through persistence.
pub struct ContactBook {
    path: PathBuf,
    data: ContactsFile,
}

impl ContactBook {
    /// Load the contact book from disk.
    pub fn load(path: &str) -> Result<Self, DoppelError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DoppelError::Config(format!(
                "failed to read contact book {path}: {e} (export your contacts first)"
            ))
        })?;
        let data: ContactsFile = serde_json::from_str(&content)
            .map_err(|e| DoppelError::Config(format!("failed to parse contact book {path}: {e}")))?;

        Ok(Self {
            path: PathBuf::from(path),
            data,
        })
    }

    /// Find a contact by phone number, ignoring formatting differences.
    pub fn find_by_phone(&self, phone: &str) -> Option<&ContactRecord> {
        let wanted = sanitize_phone(phone);
        if wanted.is_empty() {
            return None;
        }
        self.data.contacts.values().find(|c| {
            c.phone_number
                .as_deref()
                .map(|p| sanitize_phone(p) == wanted)
                .unwrap_or(false)
        })
    }

    /// Record the alias LID for a contact and write the file through.
    ///
    /// Returns `Ok(false)` without touching disk when the stored alias
    /// already equals `lid` — re-discovery of the same alias is a no-op.
    pub fn set_alias(&mut self, jid: &str, lid: &str) -> Result<bool, DoppelError> {
        let record = self
            .data
            .contacts
            .get_mut(jid)
            .ok_or_else(|| DoppelError::Persistence(format!("contact {jid} not in book")))?;

        if record.lid.as_deref() == Some(lid) {
            return Ok(false);
        }

        record.lid = Some(lid.to_string());
        self.save()?;
        info!("contact book: stored alias {lid} for {jid}");
        Ok(true)
    }

    fn save(&self) -> Result<(), DoppelError> {
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| DoppelError::Persistence(format!("serialize contact book: {e}")))?;
        std::fs::write(&self.path, json)
            .map_err(|e| DoppelError::Persistence(format!("write contact book: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_fixture(dir: &str) -> String {
        let path = std::env::temp_dir().join(dir);
        let _ = std::fs::remove_file(&path);
        let json = r#"{
            "exported_at": "2025-11-02T10:00:00Z",
            "contacts": {
                "15551234567@s.whatsapp.net": {
                    "jid": "15551234567@s.whatsapp.net",
                    "name": "Sam",
                    "type": "individual",
                    "phone_number": "+1 555 123 4567"
                }
            }
        }"#;
        std::fs::write(&path, json).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_sanitize_phone() {
        assert_eq!(sanitize_phone("+1 (555) 123-4567"), "15551234567");
        assert_eq!(sanitize_phone("no digits"), "");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = ContactBook::load("/nonexistent/contacts.json").unwrap_err();
        assert!(matches!(err, DoppelError::Config(_)));
    }

    #[test]
    fn test_find_by_phone_ignores_formatting() {
        let path = book_fixture("doppel_contacts_find.json");
        let book = ContactBook::load(&path).unwrap();
        let contact = book.find_by_phone("1-555-123-4567").unwrap();
        assert_eq!(contact.name, "Sam");
        assert!(contact.lid.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_set_alias_writes_through_and_is_idempotent() {
        let path = book_fixture("doppel_contacts_alias.json");
        let mut book = ContactBook::load(&path).unwrap();

        let changed = book
            .set_alias("15551234567@s.whatsapp.net", "987654321@lid")
            .unwrap();
        assert!(changed);

        // The write is visible to a fresh load.
        let reloaded = ContactBook::load(&path).unwrap();
        assert_eq!(
            reloaded.find_by_phone("15551234567").unwrap().lid.as_deref(),
            Some("987654321@lid")
        );

        // Same alias again: no change reported, no second write.
        let changed = book
            .set_alias("15551234567@s.whatsapp.net", "987654321@lid")
            .unwrap();
        assert!(!changed);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_set_alias_unknown_jid_is_persistence_error() {
        let path = book_fixture("doppel_contacts_unknown.json");
        let mut book = ContactBook::load(&path).unwrap();
        let err = book.set_alias("0@s.whatsapp.net", "1@lid").unwrap_err();
        assert!(matches!(err, DoppelError::Persistence(_)));
        let _ = std::fs::remove_file(&path);
    }
}
