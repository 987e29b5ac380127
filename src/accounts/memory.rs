//! In-memory stores and collaborators for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    error::StoreError,
    otp_store::OtpStore,
    repo::{next_cursor, AccountStore},
    repo_types::{Account, AccountPage},
    services::CodeSource,
};
use crate::{cursor::Cursor, mailer::OtpMailer};

#[derive(Default)]
pub struct MemoryAccountStore {
    rows: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Insert bypassing the service, e.g. to control timestamps.
    pub fn seed(&self, account: Account) {
        self.rows.lock().unwrap().insert(account.id, account);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: i64,
    ) -> Result<AccountPage, StoreError> {
        let mut rows: Vec<Account> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        let accounts: Vec<Account> = rows
            .into_iter()
            .filter(|a| match cursor {
                None => true,
                Some(Cursor { created_at, id: None }) => a.created_at > created_at,
                Some(Cursor { created_at, id: Some(id) }) => (a.created_at, a.id) > (created_at, id),
            })
            .take(limit.max(0) as usize)
            .collect();
        let next_cursor = next_cursor(&accounts, limit);
        Ok(AccountPage {
            accounts,
            next_cursor,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|a| a.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&account.id) || rows.values().any(|a| a.email == account.email) {
            return Err(StoreError::Duplicate);
        }
        rows.insert(account.id, account.clone());
        Ok(())
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .values()
            .any(|a| a.id != account.id && a.email == account.email)
        {
            return Err(StoreError::Duplicate);
        }
        match rows.get_mut(&account.id) {
            Some(row) => {
                row.username = account.username.clone();
                row.email = account.email.clone();
                row.password_hash = account.password_hash.clone();
                row.updated_at = account.updated_at;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.rows
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

#[derive(Default)]
pub struct MemoryOtpStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryOtpStore {
    fn live(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn consume(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() && value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Records every code it is asked to send; can be told to fail.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        let m = Self::default();
        m.fail.store(true, Ordering::SeqCst);
        m
    }

    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(addr, _)| addr == to)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl OtpMailer for RecordingMailer {
    async fn send_otp(&self, to: &str, code: &str) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("smtp unavailable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string()));
        Ok(())
    }
}

/// Hands out a fixed sequence of codes, then repeats the last one.
pub struct FixedCodes(pub Mutex<Vec<u32>>);

impl FixedCodes {
    pub fn new(codes: &[u32]) -> Self {
        let mut v = codes.to_vec();
        v.reverse();
        Self(Mutex::new(v))
    }
}

impl CodeSource for FixedCodes {
    fn uniform_int(&self, low: u32, high_exclusive: u32) -> u32 {
        let mut codes = self.0.lock().unwrap();
        let code = if codes.len() > 1 {
            codes.pop().unwrap_or(low)
        } else {
            codes.last().copied().unwrap_or(low)
        };
        assert!((low..high_exclusive).contains(&code));
        code
    }
}

/// In-memory store whose updates always fail.
#[derive(Default)]
pub struct RejectingUpdates {
    inner: MemoryAccountStore,
}

#[async_trait]
impl AccountStore for RejectingUpdates {
    async fn fetch_page(
        &self,
        cursor: Option<Cursor>,
        limit: i64,
    ) -> Result<AccountPage, StoreError> {
        self.inner.fetch_page(cursor, limit).await
    }
    async fn get_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        self.inner.get_by_id(id).await
    }
    async fn get_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.inner.get_by_email(email).await
    }
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.insert(account).await
    }
    async fn update(&self, _: &Account) -> Result<(), StoreError> {
        Err(StoreError::Backend(anyhow::anyhow!("database is read-only")))
    }
    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

/// Account store whose every call outlives any sane timeout.
pub struct StalledAccountStore;

#[async_trait]
impl AccountStore for StalledAccountStore {
    async fn fetch_page(&self, _: Option<Cursor>, _: i64) -> Result<AccountPage, StoreError> {
        stall().await
    }
    async fn get_by_id(&self, _: Uuid) -> Result<Account, StoreError> {
        stall().await
    }
    async fn get_by_email(&self, _: &str) -> Result<Account, StoreError> {
        stall().await
    }
    async fn insert(&self, _: &Account) -> Result<(), StoreError> {
        stall().await
    }
    async fn update(&self, _: &Account) -> Result<(), StoreError> {
        stall().await
    }
    async fn delete(&self, _: Uuid) -> Result<(), StoreError> {
        stall().await
    }
}

async fn stall<T>() -> Result<T, StoreError> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Err(StoreError::Backend(anyhow::anyhow!("stalled store woke up")))
}
