use crate::domain::{Account, AccountError, AccountId, NewAccount};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Storage-access seam for accounts.
///
/// Lookups of unknown ids are not errors at this layer: `get_by_id` yields
/// `None` and `update`/`delete` leave the store untouched.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync + 'static {
    async fn get_all(&self) -> Result<Vec<Account>, AccountError>;
    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, AccountError>;
    async fn add(&self, account: NewAccount) -> Result<Account, AccountError>;
    async fn update(&self, account: &Account) -> Result<(), AccountError>;
    async fn delete(&self, id: AccountId) -> Result<(), AccountError>;
}

/// List-backed repository. Ids come from a counter and are never reused.
#[derive(Debug)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<Vec<Account>>,
    next_id: AtomicU64,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryAccountRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepositoryTrait for InMemoryAccountRepository {
    async fn get_all(&self) -> Result<Vec<Account>, AccountError> {
        Ok(self.accounts.read().await.clone())
    }

    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>, AccountError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn add(&self, account: NewAccount) -> Result<Account, AccountError> {
        let mut accounts = self.accounts.write().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let account = Account::from_new(id, account);
        accounts.push(account.clone());
        debug!("Stored account {} ({} total)", id, accounts.len());
        Ok(account)
    }

    async fn update(&self, account: &Account) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;
        match accounts.iter_mut().find(|a| a.id == account.id) {
            Some(existing) => *existing = account.clone(),
            None => debug!("Update skipped, account {} not stored", account.id),
        }
        Ok(())
    }

    async fn delete(&self, id: AccountId) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;
        if let Some(pos) = accounts.iter().position(|a| a.id == id) {
            accounts.remove(pos);
        }
        Ok(())
    }
}
