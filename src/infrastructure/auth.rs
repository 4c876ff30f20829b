use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json, RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::Display;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::infrastructure::user_repository::{NewUser, User, UserRepository, UserRepositoryError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token has been revoked")]
    TokenBlacklisted,
    #[error("Missing credentials")]
    MissingCredentials,
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("Account is locked")]
    AccountLocked,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Username '{0}' already exists")]
    UsernameAlreadyExists(String),
    #[error("Password hash error: {0}")]
    PasswordHashError(String),
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<UserRepositoryError> for AuthError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::NotFound(_) => AuthError::InvalidCredentials,
            UserRepositoryError::UsernameExists(username) => {
                AuthError::UsernameAlreadyExists(username)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub exp: i64,
    pub iat: i64,
    pub roles: Vec<UserRole>,
    pub token_type: TokenType,
    pub jti: String,
    pub sid: String, // login session shared by every token of one login
}

impl Claims {
    /// Admins and bank managers may mutate accounts.
    pub fn require_staff(&self) -> Result<(), AuthError> {
        let staff = self
            .roles
            .iter()
            .any(|r| matches!(r, UserRole::Admin | UserRole::BankManager));
        if staff {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Admin,
    BankManager,
    Customer,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub refresh_token_secret: String,
    pub access_token_expiry: i64,  // in seconds
    pub refresh_token_expiry: i64, // in seconds
    pub max_failed_attempts: i32,
    pub lockout_duration_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "default_secret".to_string(),
            refresh_token_secret: "default_refresh_secret".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            max_failed_attempts: 5,
            lockout_duration_minutes: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "username must be 3-50 characters"))]
    pub username: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String, // Typically "Bearer"
    pub expires_in: i64,    // Access token expiry in seconds
    pub user_id: String,
    pub roles: Vec<UserRole>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "refresh_token is required"))]
    pub refresh_token: String,
}

pub struct AuthService {
    config: AuthConfig,
    user_repository: Arc<UserRepository>,
    // jti -> exp of revoked tokens
    revoked: DashMap<String, i64>,
    // sid -> latest possible exp of any token in the ended session
    ended_sessions: DashMap<String, i64>,
}

impl AuthService {
    pub fn new(config: AuthConfig, user_repository: Arc<UserRepository>) -> Self {
        Self {
            config,
            user_repository,
            revoked: DashMap::new(),
            ended_sessions: DashMap::new(),
        }
    }

    pub fn register_user(
        &self,
        username: String,
        password: &str,
        roles: Vec<UserRole>,
    ) -> Result<User, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::PasswordHashError(e.to_string()))?
            .to_string();

        let user = self.user_repository.create(&NewUser {
            username,
            password_hash,
            roles,
        })?;
        info!("Registered user {} with roles {:?}", user.username, user.roles);
        Ok(user)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginResponse, AuthError> {
        let user = self
            .user_repository
            .find_by_username(username)
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        if let Some(locked_until) = user.locked_until {
            if Utc::now() < locked_until {
                return Err(AuthError::AccountLocked);
            }
            // Lock expired
            self.user_repository.update_lockout(username, None, 0)?;
        }

        if !Self::verify_password(&user.password_hash, password)? {
            let failed_attempts = self.user_repository.increment_failed_attempts(username)?;
            if failed_attempts >= self.config.max_failed_attempts {
                let locked_until =
                    Utc::now() + ChronoDuration::minutes(self.config.lockout_duration_minutes);
                self.user_repository
                    .update_lockout(username, Some(locked_until), failed_attempts)?;
                warn!("User {} locked until {}", username, locked_until);
                return Err(AuthError::AccountLocked);
            }
            warn!("Failed login for {} ({} attempts)", username, failed_attempts);
            return Err(AuthError::InvalidCredentials);
        }

        self.user_repository.update_login_info(username, Utc::now())?;
        self.issue_tokens(&user, &Uuid::new_v4().to_string())
    }

    pub fn refresh_token(&self, refresh_token: &str) -> Result<LoginResponse, AuthError> {
        let claims = self.validate_token(refresh_token, TokenType::Refresh)?;

        let user = self
            .user_repository
            .find_by_username(&claims.sub)
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        // Refresh tokens are single use; the new pair stays in the same session.
        self.revoke(&claims);
        self.issue_tokens(&user, &claims.sid)
    }

    pub fn validate_token(&self, token: &str, expected_type: TokenType) -> Result<Claims, AuthError> {
        let secret_key = match expected_type {
            TokenType::Access => &self.config.jwt_secret,
            TokenType::Refresh => &self.config.refresh_token_secret,
        };
        let decoding_key = DecodingKey::from_secret(secret_key.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;

        if token_data.claims.token_type != expected_type {
            return Err(AuthError::InvalidToken);
        }
        if self.revoked.contains_key(&token_data.claims.jti)
            || self.ended_sessions.contains_key(&token_data.claims.sid)
        {
            return Err(AuthError::TokenBlacklisted);
        }

        Ok(token_data.claims)
    }

    /// Blacklists the token until it would have expired anyway.
    pub fn revoke(&self, claims: &Claims) {
        let now = Utc::now().timestamp();
        self.revoked.retain(|_, exp| *exp > now);
        if claims.exp > now {
            self.revoked.insert(claims.jti.clone(), claims.exp);
        }
    }

    /// Logout. Revokes every token of the session `claims` belongs to,
    /// including refresh tokens that were never presented here.
    pub fn end_session(&self, claims: &Claims) {
        self.revoke(claims);
        let now = Utc::now().timestamp();
        self.ended_sessions.retain(|_, exp| *exp > now);
        // No token of this session can be minted after this point.
        let horizon = now + self.config.refresh_token_expiry.max(self.config.access_token_expiry);
        self.ended_sessions.insert(claims.sid.clone(), horizon);
        info!("Session of {} ended", claims.sub);
    }

    fn issue_tokens(&self, user: &User, sid: &str) -> Result<LoginResponse, AuthError> {
        let access_token = self.generate_token(&user.username, &user.roles, sid, TokenType::Access)?;
        let refresh_token =
            self.generate_token(&user.username, &user.roles, sid, TokenType::Refresh)?;

        Ok(LoginResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiry,
            user_id: user.id.to_string(),
            roles: user.roles.clone(),
        })
    }

    fn generate_token(
        &self,
        username: &str,
        roles: &[UserRole],
        sid: &str,
        token_type: TokenType,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp_duration = match token_type {
            TokenType::Access => ChronoDuration::seconds(self.config.access_token_expiry),
            TokenType::Refresh => ChronoDuration::seconds(self.config.refresh_token_expiry),
        };

        let claims = Claims {
            sub: username.to_string(),
            exp: (now + exp_duration).timestamp(),
            iat: now.timestamp(),
            roles: roles.to_vec(),
            token_type,
            jti: Uuid::new_v4().to_string(),
            sid: sid.to_string(),
        };

        let secret_key = match token_type {
            TokenType::Access => &self.config.jwt_secret,
            TokenType::Refresh => &self.config.refresh_token_secret,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret_key.as_bytes()),
        )
        .map_err(AuthError::JwtError)
    }

    fn verify_password(password_hash: &str, password: &str) -> Result<bool, AuthError> {
        let parsed_hash = PasswordHash::new(password_hash)
            .map_err(|e| AuthError::PasswordHashError(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }
}

impl<S> FromRequestParts<S> for Claims
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::MissingCredentials)?;

        let auth_service = Arc::<AuthService>::from_ref(state);
        auth_service.validate_token(bearer.token(), TokenType::Access)
    }
}

/// Claims of an Admin or BankManager. Being a parts extractor, it rejects
/// with 403 before any request body is read or validated.
#[derive(Debug, Clone)]
pub struct StaffClaims(pub Claims);

impl<S> FromRequestParts<S> for StaffClaims
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = Claims::from_request_parts(parts, state).await?;
        claims.require_staff()?;
        Ok(StaffClaims(claims))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::TokenBlacklisted
            | AuthError::MissingCredentials => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden | AuthError::AccountLocked | AuthError::AccountInactive => {
                StatusCode::FORBIDDEN
            }
            AuthError::UsernameAlreadyExists(_) => StatusCode::CONFLICT,
            AuthError::PasswordHashError(_)
            | AuthError::JwtError(_)
            | AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
