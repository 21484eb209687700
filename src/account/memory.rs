//! In-memory credential store for tests and ephemeral runs.

use super::{Account, AccountUpdate, CredentialStore, NewAccount, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

/// Accounts in a mutex-guarded map keyed by id. The single lock serializes
/// every operation, which keeps create's uniqueness checks atomic with the
/// insert without any index bookkeeping.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock();

        if accounts.values().any(|a| a.username == new.username) {
            return Err(StoreError::DuplicateUsername);
        }
        if accounts.values().any(|a| a.email == new.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let account = Account {
            id: Uuid::new_v4().to_string(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login: None,
        };
        accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.lock();
        Ok(accounts.values().find(|a| a.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.lock();
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.lock();
        Ok(accounts.get(id).cloned())
    }

    async fn touch_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock();
        let account = accounts.get_mut(id).ok_or(StoreError::NotFound)?;
        account.last_login = Some(at);
        account.updated_at = at;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        update: AccountUpdate,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock();

        if let Some(ref email) = update.email {
            if accounts.values().any(|a| a.id != id && &a.email == email) {
                return Err(StoreError::DuplicateEmail);
            }
        }

        let account = accounts.get_mut(id).ok_or(StoreError::NotFound)?;
        if let Some(email) = update.email {
            account.email = email;
        }
        if let Some(first_name) = update.first_name {
            account.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            account.last_name = last_name;
        }
        if let Some(is_active) = update.is_active {
            account.is_active = is_active;
        }
        account.updated_at = now;
        Ok(account.clone())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.into(),
            email: email.into(),
            password_hash: "$pbkdf2-sha256$i=1000$salt$hash".into(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let store = MemoryStore::new();
        let created = store
            .create(new_account("alice", "alice@example.com"), t(1_000))
            .await
            .unwrap();

        assert_eq!(
            store.find_by_id(&created.id).await.unwrap().unwrap().username,
            "alice"
        );
        assert_eq!(
            store.find_by_username("alice").await.unwrap().unwrap().id,
            created.id
        );
        assert_eq!(
            store
                .find_by_email("alice@example.com")
                .await
                .unwrap()
                .unwrap()
                .id,
            created.id
        );
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicates_are_rejected() {
        let store = MemoryStore::new();
        store
            .create(new_account("alice", "alice@example.com"), t(1_000))
            .await
            .unwrap();

        assert_eq!(
            store
                .create(new_account("alice", "fresh@example.com"), t(1_001))
                .await
                .unwrap_err(),
            StoreError::DuplicateUsername
        );
        assert_eq!(
            store
                .create(new_account("bob", "alice@example.com"), t(1_001))
                .await
                .unwrap_err(),
            StoreError::DuplicateEmail
        );
    }

    #[tokio::test]
    async fn touch_and_update_refresh_updated_at() {
        let store = MemoryStore::new();
        let account = store
            .create(new_account("alice", "alice@example.com"), t(1_000))
            .await
            .unwrap();

        store.touch_last_login(&account.id, t(2_000)).await.unwrap();
        let reloaded = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_login, Some(t(2_000)));
        assert_eq!(reloaded.updated_at, t(2_000));
        assert_eq!(reloaded.created_at, t(1_000));

        let updated = store
            .update(
                &account.id,
                AccountUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
                t(3_000),
            )
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.updated_at, t(3_000));
        assert_eq!(updated.last_login, Some(t(2_000)));
    }

    #[tokio::test]
    async fn update_rejects_email_taken_by_another_account() {
        let store = MemoryStore::new();
        store
            .create(new_account("alice", "alice@example.com"), t(1_000))
            .await
            .unwrap();
        let bob = store
            .create(new_account("bob", "bob@example.com"), t(1_000))
            .await
            .unwrap();

        assert_eq!(
            store
                .update(
                    &bob.id,
                    AccountUpdate {
                        email: Some("alice@example.com".into()),
                        ..Default::default()
                    },
                    t(2_000),
                )
                .await
                .unwrap_err(),
            StoreError::DuplicateEmail
        );

        // Re-asserting your own email is not a conflict.
        assert!(store
            .update(
                &bob.id,
                AccountUpdate {
                    email: Some("bob@example.com".into()),
                    ..Default::default()
                },
                t(2_001),
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        assert_eq!(
            store.touch_last_login("ghost", t(1_000)).await.unwrap_err(),
            StoreError::NotFound
        );
        assert_eq!(
            store
                .update("ghost", AccountUpdate::default(), t(1_000))
                .await
                .unwrap_err(),
            StoreError::NotFound
        );
    }

    #[tokio::test]
    async fn concurrent_duplicate_creates_have_one_winner() {
        let store = Arc::new(MemoryStore::new());

        let a = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create(new_account("alice", "first@example.com"), t(1_000))
                    .await
            })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create(new_account("alice", "second@example.com"), t(1_000))
                    .await
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
        let losing = if a.is_ok() { b } else { a };
        assert_eq!(losing.unwrap_err(), StoreError::DuplicateUsername);
    }
}
