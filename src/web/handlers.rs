use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::application::{AccountService, InterestOutcome, InterestRate, ServiceMetricsSnapshot};
use crate::domain::{validate_non_negative, Account, AccountError, AccountId, AccountType, NewAccount};
use crate::infrastructure::{
    auth::{
        AuthError, AuthService, Claims, LoginRequest, LoginResponse, RefreshTokenRequest,
        RegisterRequest, StaffClaims, UserRole,
    },
    middleware::{ValidatedJson, API_VERSION},
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Auth(err) => return err.into_response(),
            ApiError::Account(err) => err,
        };

        let status = match &err {
            AccountError::NotFound(_) => StatusCode::NOT_FOUND,
            AccountError::InvalidArgument(_)
            | AccountError::PositiveBalance { .. }
            | AccountError::AlreadyClosed(_)
            | AccountError::InterestNotApplicable(_)
            | AccountError::BalanceOverflow(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(serde_json::json!({ "error": err.to_string() }));
        (status, body).into_response()
    }
}

/// Full replacement of an account's editable fields. `is_active` only changes
/// through the close operation, so the stored value is always kept.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 1, max = 34, message = "account_number must be 1-34 characters"))]
    pub account_number: String,
    #[validate(length(min = 1, max = 100, message = "holder_name must be 1-100 characters"))]
    pub holder_name: String,
    #[validate(custom = "validate_non_negative")]
    pub balance: Decimal,
    pub account_type: AccountType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub username: String,
    pub roles: Vec<UserRole>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub api_version: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_version: API_VERSION.to_string(),
    })
}

pub async fn metrics(State(service): State<Arc<AccountService>>) -> Json<ServiceMetricsSnapshot> {
    Json(service.metrics())
}

pub async fn get_all_accounts(
    State(service): State<Arc<AccountService>>,
    _claims: Claims,
) -> Result<Json<Vec<Account>>, ApiError> {
    Ok(Json(service.get_all_accounts().await?))
}

pub async fn get_account(
    State(service): State<Arc<AccountService>>,
    _claims: Claims,
    Path(id): Path<AccountId>,
) -> Result<Json<Account>, ApiError> {
    let account = service
        .get_account(id)
        .await?
        .ok_or(AccountError::NotFound(id))?;
    Ok(Json(account))
}

pub async fn create_account(
    State(service): State<Arc<AccountService>>,
    StaffClaims(claims): StaffClaims,
    ValidatedJson(payload): ValidatedJson<NewAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let account = service.create_account(payload).await?;
    info!("{} opened account {}", claims.sub, account.id);

    let location = format!("/api/v1/accounts/{}", account.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(account)))
}

pub async fn update_account(
    State(service): State<Arc<AccountService>>,
    StaffClaims(claims): StaffClaims,
    Path(id): Path<AccountId>,
    ValidatedJson(payload): ValidatedJson<UpdateAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    let existing = service
        .get_account(id)
        .await?
        .ok_or(AccountError::NotFound(id))?;

    let account = Account {
        id,
        account_number: payload.account_number,
        holder_name: payload.holder_name,
        balance: payload.balance,
        is_active: existing.is_active,
        account_type: payload.account_type,
    };
    let account = service.update_account(account).await?;
    info!("{} updated account {}", claims.sub, id);
    Ok(Json(account))
}

pub async fn close_account(
    State(service): State<Arc<AccountService>>,
    StaffClaims(claims): StaffClaims,
    Path(id): Path<AccountId>,
) -> Result<Json<Account>, ApiError> {
    let account = service.close_account(id).await?;
    info!("{} closed account {}", claims.sub, id);
    Ok(Json(account))
}

pub async fn calculate_interest(
    State(service): State<Arc<AccountService>>,
    StaffClaims(_claims): StaffClaims,
    Path(id): Path<AccountId>,
) -> Result<Json<InterestOutcome>, ApiError> {
    Ok(Json(service.calculate_interest(id).await?))
}

pub async fn get_interest_rates(
    State(service): State<Arc<AccountService>>,
    _claims: Claims,
) -> Json<Vec<InterestRate>> {
    Json(service.interest_rates())
}

pub async fn register(
    State(auth_service): State<Arc<AuthService>>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(move || {
        auth_service.register_user(payload.username, &payload.password, vec![UserRole::Customer])
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredUser {
            id: user.id,
            username: user.username,
            roles: user.roles,
        }),
    ))
}

pub async fn login(
    State(auth_service): State<Arc<AuthService>>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let tokens = run_blocking(move || auth_service.login(&payload.username, &payload.password)).await?;
    Ok(Json(tokens))
}

pub async fn refresh(
    State(auth_service): State<Arc<AuthService>>,
    ValidatedJson(payload): ValidatedJson<RefreshTokenRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(auth_service.refresh_token(&payload.refresh_token)?))
}

/// Ends the whole login session: the presented access token and every
/// refresh token issued alongside it stop validating.
pub async fn logout(State(auth_service): State<Arc<AuthService>>, claims: Claims) -> StatusCode {
    auth_service.end_session(&claims);
    info!("{} logged out", claims.sub);
    StatusCode::NO_CONTENT
}

// Password hashing is CPU bound; keep it off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::InternalError(e.to_string()))?
}
