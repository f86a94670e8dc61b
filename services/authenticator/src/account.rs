//! Account storage (spec §3 "Account / LoginAttempt"). `AccountStore` is
//! a trait so the in-memory implementation used here can later be
//! swapped for a real database without touching `core`, mirroring the
//! teacher's own `Authenticator` holding its user map behind a plain
//! field — generalized to a seam instead of a concrete `HashMap`.

use chrono::{DateTime, Utc};
use flux::UserId;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account store unavailable")]
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

pub trait AccountStore: Send + Sync {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;
    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    fn insert(&self, username: String, email: String, password_hash: String) -> Result<Account, StoreError>;
    fn touch_last_login(&self, account_id: UserId) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<UserId, Account>,
    next_id: UserId,
}

pub struct InMemoryAccountStore {
    inner: Mutex<Inner>,
}

impl InMemoryAccountStore {
    pub fn new() -> InMemoryAccountStore {
        InMemoryAccountStore {
            inner: Mutex::new(Inner { by_id: HashMap::new(), next_id: 1 }),
        }
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        InMemoryAccountStore::new()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(inner.by_id.values().find(|a| a.username == username).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(inner.by_id.values().find(|a| a.email == email).cloned())
    }

    fn insert(&self, username: String, email: String, password_hash: String) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Unavailable)?;
        let id = inner.next_id;
        inner.next_id += 1;

        let account = Account {
            id,
            username,
            email,
            password_hash,
            created_at: Utc::now(),
            last_login: None,
        };
        inner.by_id.insert(id, account.clone());
        Ok(account)
    }

    fn touch_last_login(&self, account_id: UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Unavailable)?;
        if let Some(account) = inner.by_id.get_mut(&account_id) {
            account.last_login = Some(Utc::now());
        }
        Ok(())
    }
}
