use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use validator::{Validate, ValidationError, ValidationErrors};

pub type AccountId = u64;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccountType {
    Savings,
    Checking,
    Loan,
    CreditCard,
    FixedDeposit,
}

impl AccountType {
    /// Rate credited by a single interest run, or `None` when the type does not earn interest.
    pub fn interest_rate(&self) -> Option<Decimal> {
        match self {
            AccountType::Savings => Some(dec!(0.04)),
            AccountType::Checking => Some(dec!(0.01)),
            AccountType::FixedDeposit => Some(dec!(0.065)),
            AccountType::Loan | AccountType::CreditCard => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct Account {
    pub id: AccountId,
    #[validate(length(min = 1, max = 34, message = "account_number must be 1-34 characters"))]
    pub account_number: String,
    #[validate(length(min = 1, max = 100, message = "holder_name must be 1-100 characters"))]
    pub holder_name: String,
    pub balance: Decimal,
    pub is_active: bool,
    pub account_type: AccountType,
}

/// Creation draft. The repository assigns the id and activates the account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct NewAccount {
    #[validate(length(min = 1, max = 34, message = "account_number must be 1-34 characters"))]
    pub account_number: String,
    #[validate(length(min = 1, max = 100, message = "holder_name must be 1-100 characters"))]
    pub holder_name: String,
    #[validate(custom = "validate_non_negative")]
    pub balance: Decimal,
    pub account_type: AccountType,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum AccountError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Account {0} not found")]
    NotFound(AccountId),
    #[error("Cannot close an account with a positive balance ({balance})")]
    PositiveBalance { balance: Decimal },
    #[error("Account {0} is already closed")]
    AlreadyClosed(AccountId),
    #[error("Interest is not applicable to {0} accounts")]
    InterestNotApplicable(AccountType),
    #[error("Interest would overflow the balance of account {0}")]
    BalanceOverflow(AccountId),
}

impl AccountError {
    /// Business-rule violations, as opposed to bad input or missing accounts.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            AccountError::PositiveBalance { .. }
                | AccountError::AlreadyClosed(_)
                | AccountError::InterestNotApplicable(_)
                | AccountError::BalanceOverflow(_)
        )
    }
}

impl From<ValidationErrors> for AccountError {
    fn from(errors: ValidationErrors) -> Self {
        AccountError::InvalidArgument(describe_validation_errors(&errors))
    }
}

/// Flattens `validator` output into "field: message" pairs, sorted by field name.
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => format!("{}: {}", field, message),
                None => format!("{}: {}", field, e.code),
            })
        })
        .collect();
    messages.sort();
    messages.join(", ")
}

pub fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut error = ValidationError::new("non_negative");
        error.message = Some("balance cannot be negative".into());
        return Err(error);
    }
    Ok(())
}

impl Account {
    pub fn from_new(id: AccountId, draft: NewAccount) -> Self {
        Account {
            id,
            account_number: draft.account_number,
            holder_name: draft.holder_name,
            balance: draft.balance,
            is_active: true,
            account_type: draft.account_type,
        }
    }

    pub fn close(&mut self) -> Result<(), AccountError> {
        if self.balance > Decimal::ZERO {
            return Err(AccountError::PositiveBalance {
                balance: self.balance,
            });
        }
        if !self.is_active {
            return Err(AccountError::AlreadyClosed(self.id));
        }
        self.is_active = false;
        Ok(())
    }

    /// Credits one period of interest and returns the amount credited.
    pub fn apply_interest(&mut self) -> Result<Decimal, AccountError> {
        let rate = self
            .account_type
            .interest_rate()
            .ok_or(AccountError::InterestNotApplicable(self.account_type))?;

        let interest = self
            .balance
            .checked_mul(rate)
            .ok_or(AccountError::BalanceOverflow(self.id))?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        self.balance = self
            .balance
            .checked_add(interest)
            .ok_or(AccountError::BalanceOverflow(self.id))?;
        Ok(interest)
    }
}
