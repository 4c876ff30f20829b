use crate::application::services::AccountService;
use crate::infrastructure::auth::{AuthService, UserRole};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::repository::{AccountRepositoryTrait, InMemoryAccountRepository};
use crate::infrastructure::user_repository::UserRepository;
use crate::web::routes::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ServiceContext {
    pub account_service: Arc<AccountService>,
    pub auth_service: Arc<AuthService>,
}

impl ServiceContext {
    pub fn app_state(&self) -> AppState {
        AppState {
            account_service: self.account_service.clone(),
            auth_service: self.auth_service.clone(),
        }
    }
}

/// Wires repositories and services together and seeds the administrator.
pub fn init_all_services(config: &AppConfig) -> Result<ServiceContext> {
    for key in config.default_credentials_in_use() {
        warn!(
            "{} is not set; the built-in default is public and unsafe outside development",
            key
        );
    }

    let repository: Arc<dyn AccountRepositoryTrait> = Arc::new(InMemoryAccountRepository::new());
    let account_service = Arc::new(AccountService::new(repository));

    let user_repository = Arc::new(UserRepository::new());
    let auth_service = Arc::new(AuthService::new(config.auth.clone(), user_repository));
    auth_service
        .register_user(
            config.admin_username.clone(),
            &config.admin_password,
            vec![UserRole::Admin],
        )
        .context("seeding administrator account")?;

    info!("Services initialized, administrator '{}' seeded", config.admin_username);
    Ok(ServiceContext {
        account_service,
        auth_service,
    })
}
