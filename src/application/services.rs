use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::{info, warn};
use validator::Validate;

use crate::domain::{Account, AccountError, AccountId, AccountType, NewAccount};
use crate::infrastructure::repository::AccountRepositoryTrait;

// Service metrics
#[derive(Debug, Default)]
struct ServiceMetrics {
    commands_processed: AtomicU64,
    commands_failed: AtomicU64,
    rule_violations: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceMetricsSnapshot {
    pub commands_processed: u64,
    pub commands_failed: u64,
    pub rule_violations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestRate {
    pub account_type: AccountType,
    pub rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestOutcome {
    pub account: Account,
    pub interest: Decimal,
}

pub struct AccountService {
    repository: Arc<dyn AccountRepositoryTrait + 'static>,
    metrics: ServiceMetrics,
}

impl AccountService {
    /// Creates a new `AccountService`.
    ///
    /// # Arguments
    ///
    /// * `repository`: The account repository for data access.
    pub fn new(repository: Arc<dyn AccountRepositoryTrait + 'static>) -> Self {
        Self {
            repository,
            metrics: ServiceMetrics::default(),
        }
    }

    pub async fn get_all_accounts(&self) -> Result<Vec<Account>, AccountError> {
        self.repository.get_all().await
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, AccountError> {
        self.repository.get_by_id(id).await
    }

    pub async fn create_account(&self, draft: NewAccount) -> Result<Account, AccountError> {
        let result: Result<Account, AccountError> = async {
            draft.validate()?;
            self.repository.add(draft).await
        }
        .await;

        if let Ok(account) = &result {
            info!(
                "Created {} account {} for {}",
                account.account_type, account.id, account.holder_name
            );
        }
        self.record(result)
    }

    pub async fn update_account(&self, account: Account) -> Result<Account, AccountError> {
        let result: Result<Account, AccountError> = async {
            account.validate()?;
            self.repository.update(&account).await?;
            Ok::<_, AccountError>(account)
        }
        .await;

        if let Ok(account) = &result {
            info!("Updated account {}", account.id);
        }
        self.record(result)
    }

    pub async fn close_account(&self, id: AccountId) -> Result<Account, AccountError> {
        let result: Result<Account, AccountError> = async {
            let mut account = self.require(id).await?;
            account.close()?;
            self.repository.update(&account).await?;
            Ok::<_, AccountError>(account)
        }
        .await;

        if result.is_ok() {
            info!("Closed account {}", id);
        }
        self.record(result)
    }

    pub async fn calculate_interest(&self, id: AccountId) -> Result<InterestOutcome, AccountError> {
        let result: Result<InterestOutcome, AccountError> = async {
            let mut account = self.require(id).await?;
            let interest = account.apply_interest()?;
            self.repository.update(&account).await?;
            Ok::<_, AccountError>(InterestOutcome { account, interest })
        }
        .await;

        if let Ok(outcome) = &result {
            info!(
                "Credited {} interest to account {}, balance now {}",
                outcome.interest, id, outcome.account.balance
            );
        }
        self.record(result)
    }

    pub fn interest_rates(&self) -> Vec<InterestRate> {
        AccountType::iter()
            .map(|account_type| InterestRate {
                account_type,
                rate: account_type.interest_rate(),
            })
            .collect()
    }

    pub fn metrics(&self) -> ServiceMetricsSnapshot {
        ServiceMetricsSnapshot {
            commands_processed: self.metrics.commands_processed.load(Ordering::Relaxed),
            commands_failed: self.metrics.commands_failed.load(Ordering::Relaxed),
            rule_violations: self.metrics.rule_violations.load(Ordering::Relaxed),
        }
    }

    async fn require(&self, id: AccountId) -> Result<Account, AccountError> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(AccountError::NotFound(id))
    }

    fn record<T>(&self, result: Result<T, AccountError>) -> Result<T, AccountError> {
        self.metrics.commands_processed.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = &result {
            self.metrics.commands_failed.fetch_add(1, Ordering::Relaxed);
            if e.is_invalid_operation() {
                self.metrics.rule_violations.fetch_add(1, Ordering::Relaxed);
            }
            warn!("Account command rejected: {}", e);
        }
        result
    }
}
