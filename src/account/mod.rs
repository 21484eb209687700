//! Account records and the credential store seam.
//!
//! The store owns account rows exclusively: ids are assigned once at
//! insertion and never reused, `created_at` is immutable, and `updated_at`
//! is refreshed by every mutating operation. Username and email are each
//! unique across all accounts, enforced atomically with the insert.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{CredentialStore, SqliteStore, StoreError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored account, password hash included. Deliberately not `Serialize`;
/// anything client-facing goes through [`AccountView`].
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    /// PHC-format hash; the plaintext never reaches the store.
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    /// Public projection of this account. Carries no password material.
    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            created_at: self.created_at,
            last_logged_in: self.last_login,
        }
    }
}

/// Client-facing account fields, shaped like the profile payload.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub last_logged_in: Option<DateTime<Utc>>,
}

/// Input for [`CredentialStore::create`]. The password arrives hashed;
/// id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

/// Partial update for [`CredentialStore::update`]; `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Account {
        Account {
            id: "11111111-2222-3333-4444-555555555555".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "$pbkdf2-sha256$i=1000$abc$def".into(),
            first_name: "Alice".into(),
            last_name: "Liddell".into(),
            is_active: true,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            last_login: None,
        }
    }

    #[test]
    fn view_carries_no_password_material() {
        let account = sample();
        let serialized = serde_json::to_string(&account.view()).unwrap();
        assert!(!serialized.contains("password"));
        assert!(!serialized.contains("pbkdf2"));
    }

    #[test]
    fn view_maps_profile_fields() {
        let account = sample();
        let view = serde_json::to_value(account.view()).unwrap();
        assert_eq!(view["id"], account.id);
        assert_eq!(view["username"], "alice");
        assert_eq!(view["email"], "alice@example.com");
        assert_eq!(view["first_name"], "Alice");
        assert_eq!(view["last_name"], "Liddell");
        assert_eq!(view["last_logged_in"], serde_json::Value::Null);
        assert!(view.get("updated_at").is_none());
    }
}
